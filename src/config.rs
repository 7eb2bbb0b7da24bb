// =============================================================================
// Runtime Configuration — immutable-after-startup pipeline settings
// =============================================================================
//
// Every tunable the analytics kernel and the workers read lives here, loaded
// once at process start and handed to every worker behind an `Arc`. Values can
// come from a JSON file (atomic tmp+rename on save, matching the rest of this
// codebase's config persistence) or be overridden by environment variables.
// All fields carry `#[serde(default = "...")]` so that adding a field never
// breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_event_log_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_relational_url() -> String {
    "postgres://localhost/candles".to_string()
}

fn default_max_stream_length() -> i64 {
    10_000
}

fn default_consumer_block_ms() -> u64 {
    1_000
}

fn default_batch_size() -> i64 {
    10
}

fn default_symbols() -> Vec<String> {
    vec!["NIFTY".to_string(), "BANKNIFTY".to_string()]
}

fn default_buy_threshold() -> u32 {
    60
}

fn default_short_covering_oi_pct() -> f64 {
    -0.003
}

fn default_short_covering_price_pct() -> f64 {
    0.005
}

fn default_gamma_spike_threshold() -> f64 {
    0.30
}

fn default_order_book_panic_ratio() -> f64 {
    0.35
}

fn default_order_book_deep_panic_ratio() -> f64 {
    0.25
}

fn default_liquidity_drying_spread() -> f64 {
    0.005
}

fn default_strong_buying_pct() -> f64 {
    0.01
}

fn default_oi_change_extra_threshold() -> f64 {
    0.01
}

// =============================================================================
// ScorerWeights
// =============================================================================

/// Weights for each component of the candle score (spec §4.4.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScorerWeights {
    #[serde(default = "ScorerWeights::default_volume")]
    pub volume: f64,
    #[serde(default = "ScorerWeights::default_oi")]
    pub oi: f64,
    #[serde(default = "ScorerWeights::default_orderbook")]
    pub orderbook: f64,
    #[serde(default = "ScorerWeights::default_volatility")]
    pub volatility: f64,
    #[serde(default = "ScorerWeights::default_greek")]
    pub greek: f64,
    #[serde(default = "ScorerWeights::default_spread_penalty")]
    pub spread_penalty: f64,
}

impl ScorerWeights {
    fn default_volume() -> f64 {
        1.0
    }
    fn default_oi() -> f64 {
        0.8
    }
    fn default_orderbook() -> f64 {
        0.6
    }
    fn default_volatility() -> f64 {
        0.5
    }
    fn default_greek() -> f64 {
        0.4
    }
    fn default_spread_penalty() -> f64 {
        0.3
    }
}

impl Default for ScorerWeights {
    fn default() -> Self {
        Self {
            volume: Self::default_volume(),
            oi: Self::default_oi(),
            orderbook: Self::default_orderbook(),
            volatility: Self::default_volatility(),
            greek: Self::default_greek(),
            spread_penalty: Self::default_spread_penalty(),
        }
    }
}

// =============================================================================
// DetectorThresholds
// =============================================================================

/// Tunable thresholds for the seller-state detector (spec §4.4.3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DetectorThresholds {
    /// Panic score at or above which the detector recommends BUY.
    #[serde(default = "default_buy_threshold")]
    pub buy_threshold: u32,
    #[serde(default = "default_short_covering_oi_pct")]
    pub short_covering_oi_pct: f64,
    #[serde(default = "default_short_covering_price_pct")]
    pub short_covering_price_pct: f64,
    #[serde(default = "default_gamma_spike_threshold")]
    pub gamma_spike_threshold: f64,
    #[serde(default = "default_order_book_panic_ratio")]
    pub order_book_panic_ratio: f64,
    #[serde(default = "default_order_book_deep_panic_ratio")]
    pub order_book_deep_panic_ratio: f64,
    #[serde(default = "default_liquidity_drying_spread")]
    pub liquidity_drying_spread: f64,
    #[serde(default = "default_strong_buying_pct")]
    pub strong_buying_pct: f64,
    #[serde(default = "default_oi_change_extra_threshold")]
    pub oi_change_extra_threshold: f64,
}

impl Default for DetectorThresholds {
    fn default() -> Self {
        Self {
            buy_threshold: default_buy_threshold(),
            short_covering_oi_pct: default_short_covering_oi_pct(),
            short_covering_price_pct: default_short_covering_price_pct(),
            gamma_spike_threshold: default_gamma_spike_threshold(),
            order_book_panic_ratio: default_order_book_panic_ratio(),
            order_book_deep_panic_ratio: default_order_book_deep_panic_ratio(),
            liquidity_drying_spread: default_liquidity_drying_spread(),
            strong_buying_pct: default_strong_buying_pct(),
            oi_change_extra_threshold: default_oi_change_extra_threshold(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level, immutable-after-startup configuration for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Connection string for the event log (Redis Streams in production).
    #[serde(default = "default_event_log_url")]
    pub event_log_url: String,

    /// Connection string for the relational store the persister writes to.
    #[serde(default = "default_relational_url")]
    pub relational_url: String,

    /// Approximate cap on entries retained per stream (XADD MAXLEN ~).
    #[serde(default = "default_max_stream_length")]
    pub max_stream_length: i64,

    /// How long a consumer-group read blocks waiting for new entries.
    #[serde(default = "default_consumer_block_ms")]
    pub consumer_block_ms: u64,

    /// Max entries returned per consumer-group read.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Instrument keys the ingestor subscribes to.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Seller-state detector thresholds.
    #[serde(default)]
    pub detector_thresholds: DetectorThresholds,

    /// Candle scorer weights.
    #[serde(default)]
    pub scorer_weights: ScorerWeights,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_log_url: default_event_log_url(),
            relational_url: default_relational_url(),
            max_stream_length: default_max_stream_length(),
            consumer_block_ms: default_consumer_block_ms(),
            batch_size: default_batch_size(),
            symbols: default_symbols(),
            detector_thresholds: DetectorThresholds::default(),
            scorer_weights: ScorerWeights::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall back to defaults
    /// with a warning, matching this codebase's established config-loading convention.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        config.apply_env_overrides();

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Override connection strings and symbol list from the environment, the way this codebase
    /// layers env vars on top of a JSON baseline.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("AURORA_EVENT_LOG_URL") {
            self.event_log_url = url;
        }
        if let Ok(url) = std::env::var("AURORA_RELATIONAL_URL") {
            self.relational_url = url;
        }
        if let Ok(syms) = std::env::var("AURORA_SYMBOLS") {
            let parsed: Vec<String> = syms
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !parsed.is_empty() {
                self.symbols = parsed;
            }
        }
    }

    /// Persist the current configuration to `path` using an atomic write (write to `.tmp`, then
    /// rename) so a crash mid-write never corrupts the file on disk.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Load from `path`, falling back to defaults (with a warning) if the file is missing or
    /// malformed.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(error = %e, "failed to load config, using defaults");
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.max_stream_length, 10_000);
        assert_eq!(cfg.consumer_block_ms, 1_000);
        assert_eq!(cfg.symbols, vec!["NIFTY", "BANKNIFTY"]);
        assert_eq!(cfg.detector_thresholds.buy_threshold, 60);
        assert!((cfg.scorer_weights.volume - 1.0).abs() < f64::EPSILON);
        assert!((cfg.scorer_weights.spread_penalty - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.max_stream_length, 10_000);
        assert_eq!(cfg.detector_thresholds.order_book_panic_ratio, 0.35);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "symbols": ["NIFTY"], "max_stream_length": 5000 }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbols, vec!["NIFTY"]);
        assert_eq!(cfg.max_stream_length, 5000);
        assert_eq!(cfg.consumer_block_ms, 1_000);
        assert_eq!(cfg.detector_thresholds.buy_threshold, 60);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.symbols, cfg2.symbols);
        assert_eq!(cfg.max_stream_length, cfg2.max_stream_length);
    }

    #[test]
    fn env_override_replaces_symbols_and_urls() {
        std::env::set_var("AURORA_SYMBOLS", "nifty, sensex");
        std::env::set_var("AURORA_EVENT_LOG_URL", "redis://example:6380");
        let mut cfg = RuntimeConfig::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.symbols, vec!["NIFTY", "SENSEX"]);
        assert_eq!(cfg.event_log_url, "redis://example:6380");
        std::env::remove_var("AURORA_SYMBOLS");
        std::env::remove_var("AURORA_EVENT_LOG_URL");
    }
}
