// =============================================================================
// Ingestor — external feed frames → Tick events on the `ticks` stream
// =============================================================================
//
// The broker WebSocket adapter and its framed binary decoding are out of
// scope; this worker only needs the two small seams that separate "how we
// get bytes" from "what the bytes mean". A concrete FeedSource/TickDecoder
// pair plugs in behind these traits. The reconnect loop mirrors this
// codebase's per-stream `loop { ... sleep(backoff) }` pattern, generalized
// with an exponential cap.
//
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::RuntimeConfig;
use crate::eventlog::EventLog;
use crate::types::{Event, Tick};

const INITIAL_BACKOFF: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// A connection to the external market-data feed. Implementations own the actual transport
/// (WebSocket, FIX session, replay file, ...); this worker only opens, reads frames, and closes.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn open(&mut self, instrument_keys: &[String]) -> Result<()>;
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>>;
    async fn close(&mut self);
}

/// Translates one raw frame into a Tick, or signals the frame should be dropped.
pub trait TickDecoder: Send + Sync {
    fn decode(&self, frame: &[u8]) -> Option<Tick>;
}

/// Drives one feed connection, publishing every decoded tick to the `ticks` stream.
pub struct Ingestor<F: FeedSource, D: TickDecoder> {
    feed: F,
    decoder: D,
    log: Arc<dyn EventLog>,
    config: Arc<RuntimeConfig>,
    reconnect_count: u64,
    decode_failures: u64,
}

impl<F: FeedSource, D: TickDecoder> Ingestor<F, D> {
    pub fn new(feed: F, decoder: D, log: Arc<dyn EventLog>, config: Arc<RuntimeConfig>) -> Self {
        Self {
            feed,
            decoder,
            log,
            config,
            reconnect_count: 0,
            decode_failures: 0,
        }
    }

    /// Run forever, reconnecting with exponential backoff (5s → 60s) on any feed error.
    pub async fn run(&mut self) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match self.run_once().await {
                Ok(()) => {
                    warn!("feed closed cleanly; reconnecting");
                    backoff = INITIAL_BACKOFF;
                }
                Err(e) => {
                    self.reconnect_count += 1;
                    error!(
                        error = %e,
                        attempt = self.reconnect_count,
                        backoff_secs = backoff.as_secs(),
                        "ingestor feed error — reconnecting"
                    );
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn run_once(&mut self) -> Result<()> {
        self.feed.open(&self.config.symbols).await?;
        info!(symbols = ?self.config.symbols, "ingestor feed open");

        loop {
            match self.feed.next_frame().await? {
                Some(frame) => {
                    let Some(tick) = self.decoder.decode(&frame) else {
                        self.decode_failures += 1;
                        warn!(total_failures = self.decode_failures, "dropped undecodable frame");
                        continue;
                    };
                    let payload = serde_json::to_vec(&Event::Tick(tick))?;
                    self.log
                        .publish("ticks", &payload, self.config.max_stream_length)
                        .await?;
                }
                None => {
                    self.feed.close().await;
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventlog::InMemoryEventLog;
    use crate::types::ist_offset;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use std::collections::VecDeque;

    struct ScriptedFeed {
        frames: VecDeque<Vec<u8>>,
    }

    #[async_trait]
    impl FeedSource for ScriptedFeed {
        async fn open(&mut self, _instrument_keys: &[String]) -> Result<()> {
            Ok(())
        }
        async fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
            Ok(self.frames.pop_front())
        }
        async fn close(&mut self) {}
    }

    struct EchoDecoder;

    impl TickDecoder for EchoDecoder {
        fn decode(&self, frame: &[u8]) -> Option<Tick> {
            if frame == b"bad" {
                return None;
            }
            Some(Tick {
                instrument_key: "NIFTY".into(),
                raw_timestamp: ist_offset().with_ymd_and_hms(2026, 7, 27, 9, 15, 5).unwrap(),
                candle_minute: ist_offset().with_ymd_and_hms(2026, 7, 27, 9, 15, 0).unwrap(),
                ltp: Decimal::new(18000, 0),
                ltq: 10,
                volume: 100,
                oi: 50,
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
            })
        }
    }

    #[tokio::test]
    async fn decodable_frames_are_published_and_bad_ones_dropped() {
        let log: Arc<dyn EventLog> = Arc::new(InMemoryEventLog::new());
        let feed = ScriptedFeed {
            frames: VecDeque::from(vec![b"ok".to_vec(), b"bad".to_vec()]),
        };
        let mut ingestor = Ingestor::new(
            feed,
            EchoDecoder,
            log.clone(),
            Arc::new(RuntimeConfig::default()),
        );
        ingestor.run_once().await.unwrap();
        assert_eq!(log.stream_length("ticks").await.unwrap(), 1);
        assert_eq!(ingestor.decode_failures, 1);
    }
}
