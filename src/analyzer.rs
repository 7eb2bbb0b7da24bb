// =============================================================================
// Analyzer Worker — candles → seller-state detector → signals
// =============================================================================

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::analytics::detector::SellerStateDetector;
use crate::config::RuntimeConfig;
use crate::eventlog::{new_consumer_name, EventLog};
use crate::types::{Candle, Event, Signal};

const GROUP: &str = "analyzer";

pub struct AnalyzerWorker {
    log: Arc<dyn EventLog>,
    config: Arc<RuntimeConfig>,
    detector: SellerStateDetector,
}

impl AnalyzerWorker {
    pub fn new(log: Arc<dyn EventLog>, config: Arc<RuntimeConfig>) -> Self {
        let detector = SellerStateDetector::new(config.detector_thresholds);
        Self {
            log,
            config,
            detector,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        self.log.ensure_group("candles", GROUP).await?;
        let consumer = new_consumer_name("analyzer");

        loop {
            let entries = self
                .log
                .read_group(
                    "candles",
                    GROUP,
                    &consumer,
                    self.config.batch_size,
                    self.config.consumer_block_ms,
                )
                .await?;

            for entry in &entries {
                match serde_json::from_slice::<Event>(&entry.payload) {
                    Ok(Event::Candle(candle)) => {
                        if let Err(e) = self.handle_candle(&candle).await {
                            warn!(error = %e, "failed to analyze candle, leaving unacked for retry");
                            continue;
                        }
                        self.log.ack("candles", GROUP, &entry.id).await?;
                    }
                    Ok(_) => {
                        self.log.ack("candles", GROUP, &entry.id).await?;
                    }
                    Err(e) => {
                        warn!(id = %entry.id, error = %e, "malformed candle payload, dropping");
                        self.log.ack("candles", GROUP, &entry.id).await?;
                    }
                }
            }
        }
    }

    async fn handle_candle(&self, candle: &Candle) -> Result<()> {
        let result = self.detector.detect(candle);

        let signal = Signal {
            event_id: uuid::Uuid::new_v4(),
            instrument_key: candle.instrument_key.clone(),
            candle_timestamp: candle.candle_timestamp,
            signal_timestamp: candle.candle_timestamp,
            seller_state: result.state,
            recommendation: result.recommendation,
            confidence: result.confidence,
            panic_score: result.panic_score,
            features: result.features,
            fired_signals: result
                .features
                .fired_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            entry_price: candle.close,
            support: candle.order_book.support.average_price,
            resistance: candle.order_book.resistance.average_price,
            candle_score: candle.candle_score,
            oi_change: candle.oi_change,
            oi_change_pct: candle.oi_change_pct,
        };

        let payload = serde_json::to_vec(&Event::Signal(signal))?;
        self.log
            .publish("signals", &payload, self.config.max_stream_length)
            .await?;

        info!(
            instrument = %candle.instrument_key,
            state = %result.state,
            recommendation = %result.recommendation,
            panic_score = result.panic_score,
            "signal published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventlog::InMemoryEventLog;
    use crate::types::{ist_offset, GreekAverages, OrderBookMetrics};
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn panic_candle() -> Candle {
        Candle {
            event_id: uuid::Uuid::new_v4(),
            instrument_key: "NIFTY".into(),
            candle_timestamp: ist_offset().with_ymd_and_hms(2026, 7, 27, 9, 15, 0).unwrap(),
            open: Decimal::from_str("182.00").unwrap(),
            high: Decimal::from_str("185.00").unwrap(),
            low: Decimal::from_str("182.00").unwrap(),
            close: Decimal::from_str("185.00").unwrap(),
            previous_close: Some(Decimal::from_str("182.00").unwrap()),
            volume: 1000,
            oi: 50_000,
            oi_change: Some(-400),
            oi_change_pct: Some(-0.008),
            vwap: Decimal::from_str("182.50").unwrap(),
            order_book: OrderBookMetrics {
                order_book_ratio: 0.28,
                bid_ask_spread: 0.008,
                ..Default::default()
            },
            greeks: GreekAverages::default(),
            gamma_spike: 0.55,
            candle_score: 42.0,
            tick_count: 5,
        }
    }

    #[tokio::test]
    async fn candle_produces_buy_signal_for_panic_profile() {
        let log: Arc<dyn EventLog> = Arc::new(InMemoryEventLog::new());
        let worker = AnalyzerWorker::new(log.clone(), Arc::new(RuntimeConfig::default()));
        worker.handle_candle(&panic_candle()).await.unwrap();

        assert_eq!(log.stream_length("signals").await.unwrap(), 1);
        log.ensure_group("signals", "verify").await.unwrap();
        let entries = log
            .read_group("signals", "verify", "v1", 10, 0)
            .await
            .unwrap();
        if let Event::Signal(signal) = serde_json::from_slice(&entries[0].payload).unwrap() {
            assert_eq!(signal.recommendation, crate::types::Recommendation::Buy);
            assert_eq!(signal.panic_score, 100);
        } else {
            panic!("expected a Signal event");
        }
    }
}
