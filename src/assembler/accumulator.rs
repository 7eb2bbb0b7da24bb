// =============================================================================
// CandleAccumulator — per-(instrument, minute) aggregation state
// =============================================================================
//
// Owned exclusively by the assembler worker for the key it was created under;
// never shared across workers. `add_tick`/`finalize` are pure with respect to
// everything except `self`, so they are unit tested directly without any
// event-log plumbing.
//
// =============================================================================

use rust_decimal::Decimal;

use crate::analytics::metrics;
use crate::analytics::orderbook::analyze_order_book;
use crate::analytics::scorer::CandleScorer;
use crate::types::{Candle, GreekAverages, Tick};

#[derive(Debug, Clone, Default)]
struct OrderBookSnapshot {
    bid_prices: Vec<Decimal>,
    bid_quantities: Vec<i64>,
    ask_prices: Vec<Decimal>,
    ask_quantities: Vec<i64>,
}

pub struct CandleAccumulator {
    instrument_key: String,
    candle_minute: chrono::DateTime<chrono::FixedOffset>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    previous_close: Option<Decimal>,
    volume: i64,
    oi: i64,
    first_gamma: Option<f64>,
    last_gamma: Option<f64>,
    last_order_book: Option<OrderBookSnapshot>,
    deltas: Vec<f64>,
    gammas: Vec<f64>,
    thetas: Vec<f64>,
    vegas: Vec<f64>,
    rhos: Vec<f64>,
    ivs: Vec<f64>,
    tick_count: u32,
}

impl CandleAccumulator {
    /// Create a new accumulator from the first tick observed for this (instrument, minute) key.
    pub fn from_first_tick(tick: &Tick) -> Self {
        let mut acc = Self {
            instrument_key: tick.instrument_key.clone(),
            candle_minute: tick.candle_minute,
            open: tick.ltp,
            high: tick.ltp,
            low: tick.ltp,
            close: tick.ltp,
            previous_close: tick.previous_close,
            volume: tick.volume,
            oi: tick.oi,
            first_gamma: tick.gamma,
            last_gamma: tick.gamma,
            last_order_book: None,
            deltas: Vec::new(),
            gammas: Vec::new(),
            thetas: Vec::new(),
            vegas: Vec::new(),
            rhos: Vec::new(),
            ivs: Vec::new(),
            tick_count: 0,
        };
        acc.merge_tick_body(tick);
        acc
    }

    /// Merge a subsequent tick for the same key into this accumulator.
    pub fn add_tick(&mut self, tick: &Tick) {
        self.merge_tick_body(tick);
    }

    fn merge_tick_body(&mut self, tick: &Tick) {
        self.high = self.high.max(tick.ltp);
        self.low = self.low.min(tick.ltp);
        self.close = tick.ltp;
        self.volume = tick.volume;
        self.oi = tick.oi;
        self.last_gamma = tick.gamma.or(self.last_gamma);

        if !tick.bid_prices.is_empty() && !tick.ask_prices.is_empty() {
            self.last_order_book = Some(OrderBookSnapshot {
                bid_prices: tick.bid_prices.clone(),
                bid_quantities: tick.bid_quantities.clone(),
                ask_prices: tick.ask_prices.clone(),
                ask_quantities: tick.ask_quantities.clone(),
            });
        }

        if let Some(d) = tick.delta {
            self.deltas.push(d);
        }
        if let Some(g) = tick.gamma {
            self.gammas.push(g);
        }
        if let Some(t) = tick.theta {
            self.thetas.push(t);
        }
        if let Some(v) = tick.vega {
            self.vegas.push(v);
        }
        if let Some(r) = tick.rho {
            self.rhos.push(r);
        }
        if let Some(iv) = tick.iv {
            self.ivs.push(iv);
        }

        self.tick_count += 1;
    }

    pub fn candle_minute(&self) -> chrono::DateTime<chrono::FixedOffset> {
        self.candle_minute
    }

    /// Finalize this accumulator into an immutable Candle, scoring it against `previous_candle`
    /// (the most recently finalized candle for the same instrument, if any).
    pub fn finalize(self, previous_candle: Option<&Candle>, scorer: &CandleScorer) -> Candle {
        let order_book = match &self.last_order_book {
            Some(snap) => analyze_order_book(
                &snap.bid_prices,
                &snap.bid_quantities,
                &snap.ask_prices,
                &snap.ask_quantities,
            ),
            None => Default::default(),
        };

        let greeks = GreekAverages {
            avg_delta: metrics::average(&self.deltas),
            avg_gamma: metrics::average(&self.gammas),
            avg_theta: metrics::average(&self.thetas),
            avg_vega: metrics::average(&self.vegas),
            avg_rho: metrics::average(&self.rhos),
            avg_iv: metrics::average(&self.ivs),
        };

        let gamma_spike = metrics::gamma_spike(self.first_gamma, self.last_gamma);

        let previous_oi = previous_candle.map(|c| c.oi);
        let (oi_change, oi_change_pct) = match metrics::oi_change(self.oi, previous_oi) {
            Some((change, pct)) => (Some(change), Some(pct)),
            None => (None, None),
        };

        let mut candle = Candle {
            event_id: uuid::Uuid::new_v4(),
            instrument_key: self.instrument_key,
            candle_timestamp: self.candle_minute,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            previous_close: self.previous_close,
            volume: self.volume,
            oi: self.oi,
            oi_change,
            oi_change_pct,
            vwap: self.close,
            order_book,
            greeks,
            gamma_spike,
            candle_score: 0.0,
            tick_count: self.tick_count,
        };

        candle.candle_score = scorer.score(&candle, None);
        candle
    }
}
