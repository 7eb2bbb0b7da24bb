// =============================================================================
// Candle Scorer
// =============================================================================
//
// Weighted sum of six components producing a single non-negative "how much
// attention does this candle deserve" scalar. Component formulas and default
// weights match the analysis module this pipeline's scoring was distilled
// from; only the weights are configuration (see `config::ScorerWeights`).
//
// =============================================================================

use rust_decimal::prelude::ToPrimitive;

use crate::config::ScorerWeights;
use crate::types::Candle;

pub struct CandleScorer {
    weights: ScorerWeights,
}

impl CandleScorer {
    pub fn new(weights: ScorerWeights) -> Self {
        Self { weights }
    }

    /// Score `candle`. `avg_volume` is a rolling mean of recent candle volumes for the same
    /// instrument, maintained by the caller; pass `None` (or `Some(0.0)`) when no history exists
    /// yet.
    pub fn score(&self, candle: &Candle, avg_volume: Option<f64>) -> f64 {
        let w = &self.weights;

        let volume_term = match avg_volume {
            Some(avg) if avg > 0.0 => (candle.volume as f64 / avg) * 1000.0,
            _ => candle.volume as f64 / 100.0,
        };

        let oi_term = candle.oi_change_pct.map(f64::abs).unwrap_or(0.0) * 10000.0;

        let orderbook_term = (candle.order_book.order_book_ratio - 0.5).abs() * 2000.0;

        let close = candle.close.to_f64().unwrap_or(0.0);
        let high = candle.high.to_f64().unwrap_or(0.0);
        let low = candle.low.to_f64().unwrap_or(0.0);
        let volatility_term = if close != 0.0 {
            ((high - low) / close) * 5000.0
        } else {
            0.0
        };

        let greek_term = candle.gamma_spike.abs() * 1000.0;

        let spread_penalty_term = candle.order_book.bid_ask_spread * 5000.0;

        let weighted_sum = w.volume * volume_term
            + w.oi * oi_term
            + w.orderbook * orderbook_term
            + w.volatility * volatility_term
            + w.greek * greek_term;

        (weighted_sum - w.spread_penalty * spread_penalty_term).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ist_offset, GreekAverages, OrderBookMetrics};
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn base_candle() -> Candle {
        Candle {
            event_id: uuid::Uuid::new_v4(),
            instrument_key: "NIFTY".into(),
            candle_timestamp: ist_offset().with_ymd_and_hms(2026, 7, 27, 9, 15, 0).unwrap(),
            open: Decimal::from_str("180.00").unwrap(),
            high: Decimal::from_str("181.00").unwrap(),
            low: Decimal::from_str("179.50").unwrap(),
            close: Decimal::from_str("180.50").unwrap(),
            previous_close: Some(Decimal::from_str("179.00").unwrap()),
            volume: 1000,
            oi: 50000,
            oi_change: Some(-500),
            oi_change_pct: Some(-0.01),
            vwap: Decimal::from_str("180.50").unwrap(),
            order_book: OrderBookMetrics {
                order_book_ratio: 0.3,
                bid_ask_spread: 0.002,
                ..Default::default()
            },
            greeks: GreekAverages::default(),
            gamma_spike: 0.1,
            candle_score: 0.0,
            tick_count: 5,
        }
    }

    #[test]
    fn quiet_candle_scores_low_but_nonnegative() {
        let scorer = CandleScorer::new(ScorerWeights::default());
        let candle = base_candle();
        let score = scorer.score(&candle, Some(900.0));
        assert!(score >= 0.0);
    }

    #[test]
    fn score_never_goes_negative_under_heavy_spread_penalty() {
        let scorer = CandleScorer::new(ScorerWeights::default());
        let mut candle = base_candle();
        candle.order_book.bid_ask_spread = 5.0;
        candle.volume = 0;
        candle.oi_change_pct = None;
        candle.gamma_spike = 0.0;
        candle.order_book.order_book_ratio = 0.5;
        let score = scorer.score(&candle, None);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn missing_avg_volume_falls_back_to_volume_over_hundred() {
        let scorer = CandleScorer::new(ScorerWeights::default());
        let mut candle = base_candle();
        candle.volume = 500;
        candle.oi_change_pct = None;
        candle.gamma_spike = 0.0;
        candle.order_book.order_book_ratio = 0.5;
        candle.order_book.bid_ask_spread = 0.0;
        let score = scorer.score(&candle, None);
        assert!((score - 5.0).abs() < 1e-9);
    }
}
