// =============================================================================
// PgStore — relational persistence for candles and signals
// =============================================================================
//
// Thin wrapper over `sqlx::PgPool`, separated from the persister worker's
// stream-consumption loop the way this pipeline separates stream plumbing
// from storage, so the SQL surface can be unit tested independently of a
// running event log.
//
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::types::{Candle, Signal};

/// Relational persistence surface the persister worker writes through. Split from `PgStore` so
/// tests can exercise the worker's stream-consumption loop against a connectionless fake without
/// standing up Postgres.
#[async_trait]
pub trait CandleSignalStore: Send + Sync {
    async fn save_candle(&self, candle: &Candle) -> Result<()>;
    async fn save_signal(&self, signal: &Signal) -> Result<()>;
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .with_context(|| format!("failed to connect to relational store at {database_url}"))?;
        Ok(Self { pool })
    }

    async fn insert_candle(&self, candle: &Candle) -> Result<()> {
        let support = &candle.order_book.support;
        let resistance = &candle.order_book.resistance;

        sqlx::query(
            r#"
            INSERT INTO candles (
                instrument_key, candle_timestamp, open, high, low, close, previous_close,
                volume, oi, oi_change, oi_change_pct, vwap,
                support_level_1, support_qty_1, support_level_2, support_qty_2,
                support_level_3, support_qty_3, support,
                resistance_level_1, resistance_qty_1, resistance_level_2, resistance_qty_2,
                resistance_level_3, resistance_qty_3, resistance,
                tbq, tsq, order_book_ratio, bid_ask_spread, big_bid_count, big_ask_count,
                avg_delta, avg_gamma, avg_theta, avg_vega, avg_rho, avg_iv,
                gamma_spike, candle_score, tick_count
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19,
                $20, $21, $22, $23, $24, $25, $26,
                $27, $28, $29, $30, $31, $32,
                $33, $34, $35, $36, $37, $38,
                $39, $40, $41
            )
            ON CONFLICT (instrument_key, candle_timestamp) DO NOTHING
            "#,
        )
        .bind(&candle.instrument_key)
        .bind(candle.candle_timestamp)
        .bind(candle.open)
        .bind(candle.high)
        .bind(candle.low)
        .bind(candle.close)
        .bind(candle.previous_close)
        .bind(candle.volume)
        .bind(candle.oi)
        .bind(candle.oi_change)
        .bind(candle.oi_change_pct)
        .bind(candle.vwap)
        .bind(support.levels[0].price)
        .bind(support.levels[0].quantity)
        .bind(support.levels[1].price)
        .bind(support.levels[1].quantity)
        .bind(support.levels[2].price)
        .bind(support.levels[2].quantity)
        .bind(support.average_price)
        .bind(resistance.levels[0].price)
        .bind(resistance.levels[0].quantity)
        .bind(resistance.levels[1].price)
        .bind(resistance.levels[1].quantity)
        .bind(resistance.levels[2].price)
        .bind(resistance.levels[2].quantity)
        .bind(resistance.average_price)
        .bind(candle.order_book.tbq)
        .bind(candle.order_book.tsq)
        .bind(candle.order_book.order_book_ratio)
        .bind(candle.order_book.bid_ask_spread)
        .bind(candle.order_book.big_bid_count as i32)
        .bind(candle.order_book.big_ask_count as i32)
        .bind(candle.greeks.avg_delta)
        .bind(candle.greeks.avg_gamma)
        .bind(candle.greeks.avg_theta)
        .bind(candle.greeks.avg_vega)
        .bind(candle.greeks.avg_rho)
        .bind(candle.greeks.avg_iv)
        .bind(candle.gamma_spike)
        .bind(candle.candle_score)
        .bind(candle.tick_count as i32)
        .execute(&self.pool)
        .await
        .context("failed to insert candle")?;

        Ok(())
    }

    async fn insert_signal(&self, signal: &Signal) -> Result<()> {
        let entry_price: Decimal = signal.entry_price;

        sqlx::query(
            r#"
            INSERT INTO signals (
                instrument_key, candle_timestamp, signal_timestamp, seller_state,
                recommendation, confidence, panic_score, entry_price, support, resistance,
                candle_score, short_covering, gamma_spike_detected, order_book_panic,
                liquidity_drying, strong_buying, fired_signals, oi_change, oi_change_pct
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19
            )
            "#,
        )
        .bind(&signal.instrument_key)
        .bind(signal.candle_timestamp)
        .bind(signal.signal_timestamp)
        .bind(signal.seller_state.to_string())
        .bind(signal.recommendation.to_string())
        .bind(signal.confidence)
        .bind(signal.panic_score as i32)
        .bind(entry_price)
        .bind(signal.support)
        .bind(signal.resistance)
        .bind(signal.candle_score)
        .bind(signal.features.short_covering)
        .bind(signal.features.gamma_spike)
        .bind(signal.features.order_book_panic)
        .bind(signal.features.liquidity_drying)
        .bind(signal.features.strong_buying)
        .bind(&signal.fired_signals)
        .bind(signal.oi_change)
        .bind(signal.oi_change_pct)
        .execute(&self.pool)
        .await
        .context("failed to insert signal")?;

        Ok(())
    }
}

#[async_trait]
impl CandleSignalStore for PgStore {
    /// Insert a candle. Duplicate `(instrument_key, candle_timestamp)` inserts are tolerated
    /// (the event log may redeliver) and silently ignored.
    async fn save_candle(&self, candle: &Candle) -> Result<()> {
        self.insert_candle(candle).await
    }

    /// Insert a signal row. Signals carry no natural uniqueness key; duplicates on event-log
    /// replay are a documented, accepted possibility.
    async fn save_signal(&self, signal: &Signal) -> Result<()> {
        self.insert_signal(signal).await
    }
}
