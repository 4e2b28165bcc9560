//! Trailing-window return statistics for a flagged index.
//!
//! All functions are pure: closes in, statistics out. The standard deviation
//! is the population form (divisor = window length), matching how the
//! simulated distribution is parameterised downstream.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean and population standard deviation of one return window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub mean: f64,
    pub std_dev: f64,
    /// Number of returns the statistics were computed from.
    pub len: usize,
}

/// Why a flagged index could not be given window statistics.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WindowError {
    /// Not enough history before the index.
    #[error("index {index} needs {required} prices, only {available} available")]
    Insufficient {
        index: usize,
        required: usize,
        available: usize,
    },

    /// A price in the window is zero or not finite; returns are undefined.
    #[error("bad price {price} at index {index}")]
    BadPrice { index: usize, price: f64 },
}

/// Simple returns of consecutive prices: `(p[k] - p[k-1]) / p[k-1]`.
///
/// `offset` is the series index of `prices[0]`, used only for error reporting.
pub fn simple_returns(prices: &[f64], offset: usize) -> Result<Vec<f64>, WindowError> {
    if let Some((k, &price)) = prices.iter().enumerate().find(|(_, p)| !p.is_finite()) {
        return Err(WindowError::BadPrice {
            index: offset + k,
            price,
        });
    }

    prices
        .windows(2)
        .enumerate()
        .map(|(k, w)| {
            if w[0] == 0.0 {
                Err(WindowError::BadPrice {
                    index: offset + k,
                    price: w[0],
                })
            } else {
                Ok((w[1] - w[0]) / w[0])
            }
        })
        .collect()
}

/// Statistics over the `minhistory` returns ending at `index`.
///
/// Uses the `minhistory + 1` closes `closes[index - minhistory ..= index]`.
pub fn window_stats(
    closes: &[f64],
    index: usize,
    minhistory: usize,
) -> Result<WindowStats, WindowError> {
    let required = minhistory + 1;
    if index >= closes.len() || index < minhistory {
        return Err(WindowError::Insufficient {
            index,
            required,
            available: closes.len().min(index + 1),
        });
    }

    let start = index - minhistory;
    let returns = simple_returns(&closes[start..=index], start)?;
    let mean = mean_f64(&returns);
    let std_dev = population_std(&returns, mean);

    Ok(WindowStats {
        mean,
        std_dev,
        len: returns.len(),
    })
}

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation around a precomputed mean.
pub fn population_std(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const PRICES: [f64; 11] = [
        100.0, 101.0, 99.0, 102.0, 103.0, 101.0, 104.0, 105.0, 103.0, 106.0, 108.0,
    ];

    #[test]
    fn returns_of_known_prices() {
        let r = simple_returns(&[100.0, 110.0, 99.0], 0).unwrap();
        assert_eq!(r.len(), 2);
        assert!((r[0] - 0.10).abs() < 1e-12);
        assert!((r[1] - (-0.10)).abs() < 1e-12);
    }

    #[test]
    fn window_uses_minhistory_returns() {
        let stats = window_stats(&PRICES, 10, 10).unwrap();
        assert_eq!(stats.len, 10);

        let returns = simple_returns(&PRICES, 0).unwrap();
        let expected_mean = returns.iter().sum::<f64>() / 10.0;
        assert!((stats.mean - expected_mean).abs() < 1e-12);
    }

    #[test]
    fn std_uses_population_divisor() {
        // returns: +0.1, -0.1 → mean 0, population std 0.1 (sample std would be ~0.1414)
        let stats = window_stats(&[100.0, 110.0, 99.0], 2, 2).unwrap();
        assert!(stats.mean.abs() < 1e-12);
        assert!((stats.std_dev - 0.1).abs() < 1e-12);
    }

    #[test]
    fn insufficient_history_is_reported() {
        let err = window_stats(&PRICES, 4, 5).unwrap_err();
        assert!(matches!(err, WindowError::Insufficient { index: 4, required: 6, .. }));

        let err = window_stats(&PRICES, 11, 5).unwrap_err();
        assert!(matches!(err, WindowError::Insufficient { index: 11, .. }));
    }

    #[test]
    fn zero_price_is_a_data_quality_error() {
        let prices = [100.0, 0.0, 101.0, 102.0];
        let err = window_stats(&prices, 3, 3).unwrap_err();
        assert_eq!(err, WindowError::BadPrice { index: 1, price: 0.0 });
    }

    #[test]
    fn nan_price_is_a_data_quality_error() {
        let prices = [100.0, 101.0, f64::NAN, 102.0];
        let err = window_stats(&prices, 3, 3).unwrap_err();
        assert!(matches!(err, WindowError::BadPrice { index: 2, .. }));
    }

    #[test]
    fn zero_final_price_is_allowed() {
        // The price at the index is only ever a numerator.
        let stats = window_stats(&[100.0, 101.0, 0.0], 2, 2).unwrap();
        assert_eq!(stats.len, 2);
    }

    #[test]
    fn constant_prices_have_zero_std() {
        let stats = window_stats(&[50.0; 6], 5, 5).unwrap();
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.std_dev, 0.0);
    }
}
