// =============================================================================
// Order-Book Analyzer
// =============================================================================
//
// Top-3 support/resistance by resting quantity, TBQ/TSQ totals, the order-book
// ratio, the bid/ask spread, and whale detection by quantity outlier. Every
// formula here matches the analysis module this pipeline's metrics were
// distilled from, level for level.
//
// =============================================================================

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::types::{LevelSummary, OrderBookMetrics, PriceLevel};

/// Top-3 levels by quantity (descending), tie-broken by higher price, padded with `(0, 0)`.
/// `average_price` is the mean over the non-zero-price entries among those three.
fn top_three(prices: &[Decimal], quantities: &[i64]) -> LevelSummary {
    let mut levels: Vec<PriceLevel> = prices
        .iter()
        .zip(quantities.iter())
        .map(|(&price, &quantity)| PriceLevel { price, quantity })
        .collect();

    levels.sort_by(|a, b| b.quantity.cmp(&a.quantity).then(b.price.cmp(&a.price)));
    levels.truncate(3);
    while levels.len() < 3 {
        levels.push(PriceLevel::default());
    }

    let non_zero: Vec<Decimal> = levels
        .iter()
        .filter(|l| l.price != Decimal::ZERO)
        .map(|l| l.price)
        .collect();
    let average_price = if non_zero.is_empty() {
        None
    } else {
        Some(non_zero.iter().sum::<Decimal>() / Decimal::from(non_zero.len() as i64))
    };

    LevelSummary {
        levels: [levels[0], levels[1], levels[2]],
        average_price,
    }
}

fn median(quantities: &[i64]) -> f64 {
    if quantities.is_empty() {
        return 0.0;
    }
    let mut sorted = quantities.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
    } else {
        sorted[mid] as f64
    }
}

fn whale_count(quantities: &[i64]) -> usize {
    let med = median(quantities);
    if med <= 0.0 {
        return 0;
    }
    quantities.iter().filter(|&&q| (q as f64) > 5.0 * med).count()
}

/// Run the full order-book analysis over one snapshot's four parallel arrays.
pub fn analyze_order_book(
    bid_prices: &[Decimal],
    bid_quantities: &[i64],
    ask_prices: &[Decimal],
    ask_quantities: &[i64],
) -> OrderBookMetrics {
    let support = top_three(bid_prices, bid_quantities);
    let resistance = top_three(ask_prices, ask_quantities);

    let tbq: i64 = bid_quantities.iter().sum();
    let tsq: i64 = ask_quantities.iter().sum();

    let order_book_ratio = if tbq + tsq > 0 {
        tbq as f64 / (tbq + tsq) as f64
    } else {
        0.5
    };

    let bid_ask_spread = match (bid_prices.first(), ask_prices.first()) {
        (Some(&bid0), Some(&ask0)) if bid0 != Decimal::ZERO => {
            ((ask0 - bid0) / bid0).to_f64().unwrap_or(0.0)
        }
        _ => 0.0,
    };

    OrderBookMetrics {
        support,
        resistance,
        tbq,
        tsq,
        order_book_ratio,
        bid_ask_spread,
        big_bid_count: whale_count(bid_quantities),
        big_ask_count: whale_count(ask_quantities),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    /// Seed case S3: top-3 support/resistance, TBQ/TSQ, ratio, and spread.
    #[test]
    fn seed_case_s3_top_three_and_ratio() {
        let bid_prices = [
            d("182.05"),
            d("182.00"),
            d("181.95"),
            d("181.90"),
            d("181.85"),
            d("181.80"),
        ];
        let bid_qty = [600, 1950, 900, 1350, 900, 1200];
        let ask_prices = [
            d("182.40"),
            d("182.45"),
            d("182.50"),
            d("182.55"),
            d("182.60"),
            d("182.65"),
        ];
        let ask_qty = [750, 675, 1800, 1200, 750, 1275];

        let metrics = analyze_order_book(&bid_prices, &bid_qty, &ask_prices, &ask_qty);

        assert_eq!(metrics.support.levels[0], PriceLevel { price: d("182.00"), quantity: 1950 });
        assert_eq!(metrics.support.levels[1], PriceLevel { price: d("181.90"), quantity: 1350 });
        assert_eq!(metrics.support.levels[2], PriceLevel { price: d("181.80"), quantity: 1200 });
        assert_eq!(metrics.support.average_price, Some(d("181.90")));

        assert_eq!(metrics.resistance.levels[0], PriceLevel { price: d("182.50"), quantity: 1800 });
        assert_eq!(metrics.resistance.levels[1], PriceLevel { price: d("182.65"), quantity: 1275 });
        assert_eq!(metrics.resistance.levels[2], PriceLevel { price: d("182.55"), quantity: 1200 });

        assert_eq!(metrics.tbq, 6900);
        assert_eq!(metrics.tsq, 6450);
        assert!((metrics.order_book_ratio - 0.5169).abs() < 0.0005);
        assert!((metrics.bid_ask_spread - 0.001923).abs() < 0.00001);
    }

    #[test]
    fn empty_book_returns_neutral_ratio_and_padded_levels() {
        let metrics = analyze_order_book(&[], &[], &[], &[]);
        assert_eq!(metrics.order_book_ratio, 0.5);
        assert_eq!(metrics.bid_ask_spread, 0.0);
        assert_eq!(metrics.support.levels, [PriceLevel::default(); 3]);
        assert_eq!(metrics.support.average_price, None);
    }

    #[test]
    fn fewer_than_three_levels_pads_with_zero() {
        let bid_prices = [d("100.00")];
        let bid_qty = [10];
        let metrics = analyze_order_book(&bid_prices, &bid_qty, &[], &[]);
        assert_eq!(metrics.support.levels[0], PriceLevel { price: d("100.00"), quantity: 10 });
        assert_eq!(metrics.support.levels[1], PriceLevel::default());
        assert_eq!(metrics.support.average_price, Some(d("100.00")));
    }

    #[test]
    fn whale_detection_flags_outlier_quantity() {
        let quantities = [10, 12, 11, 9, 100];
        assert_eq!(whale_count(&quantities), 1);
    }

    #[test]
    fn zero_bid_price_gives_zero_spread() {
        let bid_prices = [Decimal::ZERO];
        let bid_qty = [10];
        let ask_prices = [d("10.00")];
        let ask_qty = [5];
        let metrics = analyze_order_book(&bid_prices, &bid_qty, &ask_prices, &ask_qty);
        assert_eq!(metrics.bid_ask_spread, 0.0);
    }
}
