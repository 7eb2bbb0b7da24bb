// =============================================================================
// Persister — candles and signals → relational store
// =============================================================================
//
// Consumes both the `candles` and `signals` streams under one consumer group
// per stream, matching the storage-consumer split of candle handling from
// signal handling. Stats are logged periodically rather than surfaced through
// a dashboard, since no dashboard is in scope here.
//
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::eventlog::{new_consumer_name, EntryId, EventLog};
use crate::storage::CandleSignalStore;
use crate::types::Event;

const GROUP: &str = "persister";
const STATS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Default)]
struct Stats {
    candles_saved: u64,
    signals_saved: u64,
    errors: u64,
}

pub struct PersisterWorker {
    log: Arc<dyn EventLog>,
    config: Arc<RuntimeConfig>,
    store: Arc<dyn CandleSignalStore>,
    stats: Stats,
}

impl PersisterWorker {
    pub fn new(
        log: Arc<dyn EventLog>,
        config: Arc<RuntimeConfig>,
        store: Arc<dyn CandleSignalStore>,
    ) -> Self {
        Self {
            log,
            config,
            store,
            stats: Stats::default(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        self.log.ensure_group("candles", GROUP).await?;
        self.log.ensure_group("signals", GROUP).await?;
        let candle_consumer = new_consumer_name("persister-candles");
        let signal_consumer = new_consumer_name("persister-signals");
        let mut last_stats = tokio::time::Instant::now();

        loop {
            self.process_batch(&candle_consumer, &signal_consumer).await?;

            if last_stats.elapsed() >= STATS_INTERVAL {
                info!(
                    candles_saved = self.stats.candles_saved,
                    signals_saved = self.stats.signals_saved,
                    errors = self.stats.errors,
                    "persister stats"
                );
                last_stats = tokio::time::Instant::now();
            }
        }
    }

    /// Read and persist one batch from each stream. Exposed separately from `run` so tests can
    /// drive a single pass without looping forever.
    async fn process_batch(&mut self, candle_consumer: &str, signal_consumer: &str) -> Result<()> {
        let candle_entries = self
            .log
            .read_group(
                "candles",
                GROUP,
                candle_consumer,
                self.config.batch_size,
                self.config.consumer_block_ms / 2,
            )
            .await?;

        for entry in &candle_entries {
            self.handle_candle_entry(&entry.id, &entry.payload).await?;
        }

        let signal_entries = self
            .log
            .read_group(
                "signals",
                GROUP,
                signal_consumer,
                self.config.batch_size,
                self.config.consumer_block_ms / 2,
            )
            .await?;

        for entry in &signal_entries {
            self.handle_signal_entry(&entry.id, &entry.payload).await?;
        }

        Ok(())
    }

    async fn handle_candle_entry(&mut self, id: &EntryId, payload: &[u8]) -> Result<()> {
        match serde_json::from_slice::<Event>(payload) {
            Ok(Event::Candle(candle)) => {
                if let Err(e) = self.store.save_candle(&candle).await {
                    self.stats.errors += 1;
                    warn!(error = %e, "failed to save candle, leaving unacked for retry");
                    return Ok(());
                }
                self.stats.candles_saved += 1;
                self.log.ack("candles", GROUP, id).await
            }
            Ok(_) => self.log.ack("candles", GROUP, id).await,
            Err(e) => {
                warn!(id = %id, error = %e, "malformed candle payload, dropping");
                self.log.ack("candles", GROUP, id).await
            }
        }
    }

    async fn handle_signal_entry(&mut self, id: &EntryId, payload: &[u8]) -> Result<()> {
        match serde_json::from_slice::<Event>(payload) {
            Ok(Event::Signal(signal)) => {
                if let Err(e) = self.store.save_signal(&signal).await {
                    self.stats.errors += 1;
                    warn!(error = %e, "failed to save signal, leaving unacked for retry");
                    return Ok(());
                }
                self.stats.signals_saved += 1;
                self.log.ack("signals", GROUP, id).await
            }
            Ok(_) => self.log.ack("signals", GROUP, id).await,
            Err(e) => {
                warn!(id = %id, error = %e, "malformed signal payload, dropping");
                self.log.ack("signals", GROUP, id).await
            }
        }
    }
}
