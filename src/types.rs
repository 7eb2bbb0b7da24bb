// =============================================================================
// Shared types used across the candle analytics pipeline
// =============================================================================

use chrono::{DateTime, FixedOffset, Timelike};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed UTC+05:30 offset the whole pipeline uses for candle-minute boundaries.
pub fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("IST offset is always valid")
}

/// One real-time market update for a single instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub instrument_key: String,
    pub raw_timestamp: DateTime<FixedOffset>,
    pub candle_minute: DateTime<FixedOffset>,
    pub ltp: Decimal,
    pub ltq: i64,
    pub volume: i64,
    pub oi: i64,
    #[serde(default)]
    pub previous_close: Option<Decimal>,
    #[serde(default)]
    pub bid_prices: Vec<Decimal>,
    #[serde(default)]
    pub bid_quantities: Vec<i64>,
    #[serde(default)]
    pub ask_prices: Vec<Decimal>,
    #[serde(default)]
    pub ask_quantities: Vec<i64>,
    #[serde(default)]
    pub tbq: Option<i64>,
    #[serde(default)]
    pub tsq: Option<i64>,
    #[serde(default)]
    pub delta: Option<f64>,
    #[serde(default)]
    pub gamma: Option<f64>,
    #[serde(default)]
    pub theta: Option<f64>,
    #[serde(default)]
    pub vega: Option<f64>,
    #[serde(default)]
    pub rho: Option<f64>,
    #[serde(default)]
    pub iv: Option<f64>,
}

impl Tick {
    /// Derive the minute-bucket this tick belongs to, truncating in the market time zone.
    pub fn candle_minute_from(raw_timestamp: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        raw_timestamp
            .date_naive()
            .and_hms_opt(raw_timestamp.hour(), raw_timestamp.minute(), 0)
            .expect("hour/minute from a valid datetime are always valid")
            .and_local_timezone(ist_offset())
            .single()
            .unwrap_or(raw_timestamp)
    }
}

/// One price level with its resting quantity, as reported on either side of the book.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: i64,
}

/// Support or resistance summary: the top three levels by quantity plus their mean price.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LevelSummary {
    pub levels: [PriceLevel; 3],
    pub average_price: Option<Decimal>,
}

/// Order-book derived metrics attached to a finalized candle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderBookMetrics {
    pub support: LevelSummary,
    pub resistance: LevelSummary,
    pub tbq: i64,
    pub tsq: i64,
    pub order_book_ratio: f64,
    pub bid_ask_spread: f64,
    pub big_bid_count: usize,
    pub big_ask_count: usize,
}

/// Arithmetic-mean Greeks sampled across a candle's ticks.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GreekAverages {
    pub avg_delta: Option<f64>,
    pub avg_gamma: Option<f64>,
    pub avg_theta: Option<f64>,
    pub avg_vega: Option<f64>,
    pub avg_rho: Option<f64>,
    pub avg_iv: Option<f64>,
}

/// A finalized one-minute aggregate, published by the candle assembler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub event_id: Uuid,
    pub instrument_key: String,
    pub candle_timestamp: DateTime<FixedOffset>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub previous_close: Option<Decimal>,
    pub volume: i64,
    pub oi: i64,
    pub oi_change: Option<i64>,
    pub oi_change_pct: Option<f64>,
    pub vwap: Decimal,
    pub order_book: OrderBookMetrics,
    pub greeks: GreekAverages,
    pub gamma_spike: f64,
    pub candle_score: f64,
    pub tick_count: u32,
}

/// The bounded set of seller-behavior classifications the detector can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SellerState {
    SellerPanic,
    ProfitBooking,
    /// Unreachable under the current rule set; preserved for forward compatibility.
    SellerDirection,
    Neutral,
}

impl std::fmt::Display for SellerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SellerPanic => write!(f, "SELLER_PANIC"),
            Self::ProfitBooking => write!(f, "PROFIT_BOOKING"),
            Self::SellerDirection => write!(f, "SELLER_DIRECTION"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// The action a signal recommends taking on the underlying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    Buy,
    Sell,
    Wait,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Wait => write!(f, "WAIT"),
        }
    }
}

/// The five boolean features the seller-state detector evaluates per candle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DetectorFeatures {
    pub short_covering: bool,
    pub gamma_spike: bool,
    pub order_book_panic: bool,
    pub liquidity_drying: bool,
    pub strong_buying: bool,
}

impl DetectorFeatures {
    pub fn fired_count(&self) -> u32 {
        [
            self.short_covering,
            self.gamma_spike,
            self.order_book_panic,
            self.liquidity_drying,
            self.strong_buying,
        ]
        .into_iter()
        .filter(|fired| *fired)
        .count() as u32
    }

    /// The ordered list of fired feature names, matching the detector's evaluation order.
    pub fn fired_names(&self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(5);
        if self.short_covering {
            names.push("short_covering");
        }
        if self.gamma_spike {
            names.push("gamma_spike");
        }
        if self.order_book_panic {
            names.push("order_book_panic");
        }
        if self.liquidity_drying {
            names.push("liquidity_drying");
        }
        if self.strong_buying {
            names.push("strong_buying");
        }
        names
    }
}

/// Emitted by the analyzer worker for every candle it processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub event_id: Uuid,
    pub instrument_key: String,
    pub candle_timestamp: DateTime<FixedOffset>,
    pub signal_timestamp: DateTime<FixedOffset>,
    pub seller_state: SellerState,
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub panic_score: u32,
    pub features: DetectorFeatures,
    /// The fired feature names, in evaluation order — materialized onto the wire so a consumer
    /// can recover which features fired without re-deriving them from `features`.
    pub fired_signals: Vec<String>,
    pub entry_price: Decimal,
    pub support: Option<Decimal>,
    pub resistance: Option<Decimal>,
    pub candle_score: f64,
    pub oi_change: Option<i64>,
    pub oi_change_pct: Option<f64>,
}

/// Tagged envelope wrapping every payload the event log carries, so a consumer that reads the
/// wrong stream can detect and drop an unrecognized tag instead of panicking on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data")]
pub enum Event {
    #[serde(rename = "tick.received")]
    Tick(Tick),
    #[serde(rename = "candle.completed")]
    Candle(Candle),
    #[serde(rename = "signal.generated")]
    Signal(Signal),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn candle_minute_truncates_seconds() {
        let ts = ist_offset().with_ymd_and_hms(2026, 7, 27, 9, 15, 47).unwrap();
        let minute = Tick::candle_minute_from(ts);
        assert_eq!(minute.hour(), 9);
        assert_eq!(minute.minute(), 15);
        assert_eq!(minute.second(), 0);
    }

    #[test]
    fn detector_features_fired_count_and_order() {
        let features = DetectorFeatures {
            short_covering: true,
            gamma_spike: false,
            order_book_panic: true,
            liquidity_drying: false,
            strong_buying: true,
        };
        assert_eq!(features.fired_count(), 3);
        assert_eq!(
            features.fired_names(),
            vec!["short_covering", "order_book_panic", "strong_buying"]
        );
    }

    #[test]
    fn seller_state_display_matches_wire_vocabulary() {
        assert_eq!(SellerState::SellerPanic.to_string(), "SELLER_PANIC");
        assert_eq!(Recommendation::Buy.to_string(), "BUY");
    }

    #[test]
    fn event_envelope_roundtrips_through_json() {
        let tick = Tick {
            instrument_key: "NIFTY".into(),
            raw_timestamp: ist_offset().with_ymd_and_hms(2026, 7, 27, 9, 15, 5).unwrap(),
            candle_minute: ist_offset().with_ymd_and_hms(2026, 7, 27, 9, 15, 0).unwrap(),
            ltp: Decimal::new(18000, 0),
            ltq: 50,
            volume: 1000,
            oi: 500,
            previous_close: None,
            bid_prices: vec![],
            bid_quantities: vec![],
            ask_prices: vec![],
            ask_quantities: vec![],
            tbq: None,
            tsq: None,
            delta: None,
            gamma: None,
            theta: None,
            vega: None,
            rho: None,
            iv: None,
        };
        let event = Event::Tick(tick);
        let json = serde_json::to_string(&event).unwrap();
        let decoded: Event = serde_json::from_str(&json).unwrap();
        match decoded {
            Event::Tick(t) => assert_eq!(t.instrument_key, "NIFTY"),
            _ => panic!("expected a Tick variant"),
        }
    }
}
