// =============================================================================
// Candle Assembler — groups the `ticks` stream into one-minute candles
// =============================================================================
//
// Finalization is event-driven: an accumulator for (instrument, minute) is
// closed out the moment a later tick for the same instrument arrives. A
// periodic sweep finalizes any accumulator left behind by an instrument that
// stopped ticking, bounding latency without a dedicated timer per key.
//
// =============================================================================

pub mod accumulator;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use tracing::{info, warn};

use crate::analytics::scorer::CandleScorer;
use crate::config::RuntimeConfig;
use crate::eventlog::{new_consumer_name, EventLog};
use crate::types::{Candle, Event, Tick};

use accumulator::CandleAccumulator;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const GROUP: &str = "candle_assembler";

pub struct CandleAssembler {
    log: Arc<dyn EventLog>,
    config: Arc<RuntimeConfig>,
    scorer: CandleScorer,
    accumulators: HashMap<(String, DateTime<FixedOffset>), CandleAccumulator>,
    previous_candle: HashMap<String, Candle>,
}

impl CandleAssembler {
    pub fn new(log: Arc<dyn EventLog>, config: Arc<RuntimeConfig>) -> Self {
        let scorer = CandleScorer::new(config.scorer_weights);
        Self {
            log,
            config,
            scorer,
            accumulators: HashMap::new(),
            previous_candle: HashMap::new(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        self.log.ensure_group("ticks", GROUP).await?;
        let consumer = new_consumer_name("assembler");
        let mut last_sweep = tokio::time::Instant::now();

        loop {
            let entries = self
                .log
                .read_group(
                    "ticks",
                    GROUP,
                    &consumer,
                    self.config.batch_size,
                    self.config.consumer_block_ms,
                )
                .await?;

            for entry in &entries {
                match serde_json::from_slice::<Event>(&entry.payload) {
                    Ok(Event::Tick(tick)) => {
                        if let Err(e) = self.handle_tick(tick).await {
                            warn!(error = %e, "failed to handle tick, leaving unacked for retry");
                            continue;
                        }
                        self.log.ack("ticks", GROUP, &entry.id).await?;
                    }
                    Ok(_) => {
                        warn!(id = %entry.id, "unexpected event type on ticks stream, dropping");
                        self.log.ack("ticks", GROUP, &entry.id).await?;
                    }
                    Err(e) => {
                        warn!(id = %entry.id, error = %e, "malformed tick payload, dropping");
                        self.log.ack("ticks", GROUP, &entry.id).await?;
                    }
                }
            }

            if last_sweep.elapsed() >= SWEEP_INTERVAL {
                self.sweep().await?;
                last_sweep = tokio::time::Instant::now();
            }
        }
    }

    async fn handle_tick(&mut self, tick: Tick) -> Result<()> {
        if let Some(previous) = self.previous_candle.get(&tick.instrument_key) {
            if tick.candle_minute <= previous.candle_timestamp {
                warn!(
                    instrument = %tick.instrument_key,
                    tick_minute = %tick.candle_minute,
                    finalized_minute = %previous.candle_timestamp,
                    "dropping out-of-order tick for an already-finalized minute"
                );
                return Ok(());
            }
        }

        let key = (tick.instrument_key.clone(), tick.candle_minute);

        for stale_key in self.stale_keys_for(&tick) {
            self.finalize_and_publish(stale_key).await?;
        }

        match self.accumulators.get_mut(&key) {
            Some(acc) => acc.add_tick(&tick),
            None => {
                self.accumulators
                    .insert(key, CandleAccumulator::from_first_tick(&tick));
            }
        }
        Ok(())
    }

    /// Every in-progress accumulator for this instrument whose minute is strictly older than the
    /// incoming tick's minute — each must be finalized before this tick can be merged, since at
    /// most one open candle per instrument is kept at a time and a gap of more than one minute can
    /// otherwise leave several stale accumulators behind at once.
    fn stale_keys_for(&self, tick: &Tick) -> Vec<(String, DateTime<FixedOffset>)> {
        self.accumulators
            .keys()
            .filter(|(instrument, minute)| {
                instrument == &tick.instrument_key && *minute < tick.candle_minute
            })
            .cloned()
            .collect()
    }

    async fn finalize_and_publish(
        &mut self,
        key: (String, DateTime<FixedOffset>),
    ) -> Result<()> {
        let Some(acc) = self.accumulators.remove(&key) else {
            return Ok(());
        };
        let instrument_key = key.0.clone();
        let previous = self.previous_candle.get(&instrument_key).cloned();
        let candle = acc.finalize(previous.as_ref(), &self.scorer);

        let payload = serde_json::to_vec(&Event::Candle(candle.clone()))?;
        self.log
            .publish("candles", &payload, self.config.max_stream_length)
            .await?;
        info!(
            instrument = %instrument_key,
            minute = %key.1,
            score = candle.candle_score,
            "candle finalized"
        );

        self.previous_candle.insert(instrument_key, candle);
        Ok(())
    }

    /// Finalize any accumulator whose minute has fully elapsed in wall-clock time, bounding
    /// latency for instruments that stop ticking mid-minute.
    async fn sweep(&mut self) -> Result<()> {
        let now: DateTime<FixedOffset> = Utc::now().with_timezone(&crate::types::ist_offset());
        let current_minute = Tick::candle_minute_from(now);

        let stale: Vec<_> = self
            .accumulators
            .keys()
            .filter(|(_, minute)| *minute < current_minute)
            .cloned()
            .collect();

        for key in stale {
            self.finalize_and_publish(key).await?;
        }
        Ok(())
    }
}
