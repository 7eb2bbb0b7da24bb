// =============================================================================
// Seller-State Detector
// =============================================================================
//
// Five boolean features, a capped panic score, and an ordered state/
// recommendation rule set. Thresholds and the BUY cutoff are configuration
// (see `config::DetectorThresholds`); the arithmetic itself is fixed and
// matches the analysis module this pipeline's detection logic was distilled
// from, point for point.
//
// =============================================================================

use rust_decimal::prelude::ToPrimitive;

use crate::config::DetectorThresholds;
use crate::types::{Candle, DetectorFeatures, Recommendation, SellerState};

pub struct DetectionResult {
    pub state: SellerState,
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub panic_score: u32,
    pub features: DetectorFeatures,
}

pub struct SellerStateDetector {
    thresholds: DetectorThresholds,
}

impl SellerStateDetector {
    pub fn new(thresholds: DetectorThresholds) -> Self {
        Self { thresholds }
    }

    fn price_change_pct(&self, candle: &Candle) -> Option<f64> {
        let previous_close = candle.previous_close?.to_f64()?;
        if previous_close <= 0.0 {
            return None;
        }
        let close = candle.close.to_f64()?;
        Some((close - previous_close) / previous_close)
    }

    fn detect_features(&self, candle: &Candle, price_change_pct: Option<f64>) -> DetectorFeatures {
        let t = &self.thresholds;

        let short_covering = candle.oi_change_pct.unwrap_or(0.0) < t.short_covering_oi_pct
            && price_change_pct.unwrap_or(0.0) > t.short_covering_price_pct;

        let gamma_spike = candle.gamma_spike.abs() > t.gamma_spike_threshold;

        let order_book_panic = candle.order_book.order_book_ratio < t.order_book_panic_ratio;

        let liquidity_drying = candle.order_book.bid_ask_spread > t.liquidity_drying_spread;

        let vwap = candle.vwap.to_f64().unwrap_or(0.0);
        let close = candle.close.to_f64().unwrap_or(0.0);
        let strong_buying = vwap > 0.0 && (close - vwap) / vwap > t.strong_buying_pct;

        DetectorFeatures {
            short_covering,
            gamma_spike,
            order_book_panic,
            liquidity_drying,
            strong_buying,
        }
    }

    fn panic_score(&self, candle: &Candle, features: &DetectorFeatures) -> u32 {
        let t = &self.thresholds;
        let mut score: i64 = 0;

        if features.short_covering {
            score += 30;
            if candle.oi_change_pct.map(f64::abs).unwrap_or(0.0) > t.oi_change_extra_threshold {
                score += 10;
            }
        }
        if features.gamma_spike {
            score += 25;
        }
        if features.order_book_panic {
            score += 20;
            if candle.order_book.order_book_ratio < t.order_book_deep_panic_ratio {
                score += 10;
            }
        }
        if features.liquidity_drying {
            score += 15;
        }
        if features.strong_buying {
            score += 10;
        }

        score.min(100).max(0) as u32
    }

    /// Run the full detection pipeline over one finalized candle.
    pub fn detect(&self, candle: &Candle) -> DetectionResult {
        let price_change_pct = self.price_change_pct(candle);
        let features = self.detect_features(candle, price_change_pct);
        let panic_score = self.panic_score(candle, &features);

        let (state, recommendation, confidence) = if panic_score >= self.thresholds.buy_threshold
        {
            (
                SellerState::SellerPanic,
                Recommendation::Buy,
                (panic_score as f64 / 100.0).min(0.9),
            )
        } else if features.fired_count() >= 2 && !features.short_covering {
            (SellerState::ProfitBooking, Recommendation::Wait, 0.6)
        } else {
            (SellerState::Neutral, Recommendation::Wait, 0.5)
        };

        DetectionResult {
            state,
            recommendation,
            confidence,
            panic_score,
            features,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ist_offset, GreekAverages, OrderBookMetrics};
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn candle_with(
        close: &str,
        previous_close: &str,
        vwap: &str,
        gamma_spike: f64,
        oi_change_pct: f64,
        order_book_ratio: f64,
        bid_ask_spread: f64,
    ) -> Candle {
        Candle {
            event_id: uuid::Uuid::new_v4(),
            instrument_key: "NIFTY".into(),
            candle_timestamp: ist_offset().with_ymd_and_hms(2026, 7, 27, 9, 15, 0).unwrap(),
            open: Decimal::from_str(previous_close).unwrap(),
            high: Decimal::from_str(close).unwrap(),
            low: Decimal::from_str(previous_close).unwrap(),
            close: Decimal::from_str(close).unwrap(),
            previous_close: Some(Decimal::from_str(previous_close).unwrap()),
            volume: 1000,
            oi: 50000,
            oi_change: None,
            oi_change_pct: Some(oi_change_pct),
            vwap: Decimal::from_str(vwap).unwrap(),
            order_book: OrderBookMetrics {
                order_book_ratio,
                bid_ask_spread,
                ..Default::default()
            },
            greeks: GreekAverages::default(),
            gamma_spike,
            candle_score: 0.0,
            tick_count: 5,
        }
    }

    /// Seed case S1: every feature fires, panic score caps at 100, BUY.
    #[test]
    fn seed_case_s1_clean_panic_buy() {
        let candle = candle_with("185.00", "182.00", "182.50", 0.55, -0.008, 0.28, 0.008);
        let detector = SellerStateDetector::new(DetectorThresholds::default());
        let result = detector.detect(&candle);

        assert!(result.features.short_covering);
        assert!(result.features.gamma_spike);
        assert!(result.features.order_book_panic);
        assert!(result.features.liquidity_drying);
        assert!(result.features.strong_buying);
        assert_eq!(result.panic_score, 100);
        assert_eq!(result.state, SellerState::SellerPanic);
        assert_eq!(result.recommendation, Recommendation::Buy);
        assert!((result.confidence - 0.9).abs() < 1e-9);
    }

    /// Seed case S2: quiet market, no features fire, NEUTRAL/WAIT.
    #[test]
    fn seed_case_s2_quiet_neutral() {
        let candle = candle_with("182.00", "181.90", "181.95", 0.0, 0.0001, 0.5, 0.001);
        let detector = SellerStateDetector::new(DetectorThresholds::default());
        let result = detector.detect(&candle);

        assert_eq!(result.panic_score, 0);
        assert_eq!(result.state, SellerState::Neutral);
        assert_eq!(result.recommendation, Recommendation::Wait);
        assert!((result.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn two_features_without_short_covering_is_profit_booking() {
        // gamma_spike + order_book_panic fire, short_covering does not.
        let candle = candle_with("182.00", "181.90", "181.95", 0.5, 0.0, 0.2, 0.0);
        let detector = SellerStateDetector::new(DetectorThresholds::default());
        let result = detector.detect(&candle);

        assert!(result.panic_score < 60);
        assert_eq!(result.state, SellerState::ProfitBooking);
        assert_eq!(result.recommendation, Recommendation::Wait);
    }

    #[test]
    fn missing_previous_close_disables_price_change_dependent_features() {
        let mut candle = candle_with("182.00", "181.90", "181.95", 0.0, -0.01, 0.5, 0.0);
        candle.previous_close = None;
        let detector = SellerStateDetector::new(DetectorThresholds::default());
        let result = detector.detect(&candle);
        assert!(!result.features.short_covering);
    }
}
