// =============================================================================
// Candle Analytics Pipeline — Main Entry Point
// =============================================================================
//
// Wires the event log, config, and relational store, then hands control to
// the orchestrator. The broker feed adapter is deployment-specific and is not
// wired here — see `ingestor` for the seam a concrete feed plugs into.
// =============================================================================

mod analytics;
mod analyzer;
mod assembler;
mod config;
mod eventlog;
mod ingestor;
mod orchestrator;
mod persister;
mod storage;
mod types;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::RuntimeConfig;
use crate::eventlog::{EventLog, RedisEventLog};
use crate::orchestrator::Orchestrator;
use crate::storage::{CandleSignalStore, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("candle analytics pipeline starting up");

    let config = Arc::new(RuntimeConfig::load_or_default("runtime_config.json"));
    info!(
        symbols = ?config.symbols,
        event_log_url = %config.event_log_url,
        "configuration loaded"
    );

    let log: Arc<dyn EventLog> = match RedisEventLog::connect(&config.event_log_url).await {
        Ok(log) => Arc::new(log),
        Err(e) => {
            error!(error = %e, "failed to connect to event log");
            return Err(e);
        }
    };

    let store: Arc<dyn CandleSignalStore> = match PgStore::connect(&config.relational_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "failed to connect to relational store");
            return Err(e);
        }
    };

    let orchestrator = Orchestrator::new(log, config.clone(), store);
    orchestrator.run_until_shutdown().await?;

    if let Err(e) = config.save("runtime_config.json") {
        error!(error = %e, "failed to save runtime config on shutdown");
    }

    info!("candle analytics pipeline shut down complete");
    Ok(())
}
