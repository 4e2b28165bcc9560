//! Signal detection and labeling.
//!
//! Detection only reads the precomputed flags on each price point. Labeling
//! (how the flags got there) is a data-preparation step applied before a
//! series enters a run.

use crate::domain::{PricePoint, TransactionType};

/// Minimum close-minus-open body, in price units, for a day to carry a signal.
pub const DEFAULT_BODY_THRESHOLD: f64 = 0.01;

/// First index labeling looks at.
const LABEL_START: usize = 2;

/// Flagged indices for `tx`, from `minhistory` to the end of the series.
///
/// Lazy and finite; call again to restart.
pub fn signal_indices(
    series: &[PricePoint],
    tx: TransactionType,
    minhistory: usize,
) -> impl Iterator<Item = usize> + '_ {
    series
        .iter()
        .enumerate()
        .skip(minhistory)
        .filter(move |(_, point)| point.flag(tx))
        .map(|(i, _)| i)
}

/// Set Buy/Sell flags from the candle body.
///
/// A day with `close - open >= body` is a Buy when it closes above the prior
/// close and a Sell when it closes below it. Every other day, and any day
/// without an open price, is cleared.
pub fn label_signals(series: &mut [PricePoint], body: f64) {
    for i in 0..series.len() {
        let prev_close = if i >= LABEL_START {
            Some(series[i - 1].close)
        } else {
            None
        };
        let point = &mut series[i];
        point.buy = false;
        point.sell = false;

        let (Some(prev_close), Some(open)) = (prev_close, point.open) else {
            continue;
        };
        if point.close - open >= body {
            point.buy = point.close > prev_close;
            point.sell = point.close < prev_close;
        }
    }
}
