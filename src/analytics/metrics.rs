// =============================================================================
// Metrics Calculator — small derived quantities shared by the assembler
// =============================================================================
//
// Average-of-samples, gamma spike, and OI-change helpers. Kept separate from
// the accumulator so they can be unit tested against their edge cases (empty
// input, zero previous values) in isolation.
//
// =============================================================================

/// Arithmetic mean of the collected samples, or `None` if there were none.
pub fn average(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }
}

/// Fractional change from `first` to `last`, or 0 when either is absent or `first` is exactly 0.
pub fn gamma_spike(first: Option<f64>, last: Option<f64>) -> f64 {
    match (first, last) {
        (Some(first), Some(last)) if first != 0.0 => (last - first) / first.abs(),
        _ => 0.0,
    }
}

/// Change in open interest and its percentage against the previous candle's OI.
///
/// Returns `None` when there is no previous candle at all. When a previous candle exists but its
/// OI was literally zero, returns `Some((0, 0.0))` rather than dividing by zero.
pub fn oi_change(current_oi: i64, previous_oi: Option<i64>) -> Option<(i64, f64)> {
    let previous_oi = previous_oi?;
    if previous_oi == 0 {
        return Some((0, 0.0));
    }
    let change = current_oi - previous_oi;
    Some((change, change as f64 / previous_oi as f64))
}
