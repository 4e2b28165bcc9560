//! Monte Carlo VaR by Gaussian resampling of a return window.
//!
//! Draws `shots` returns from Normal(mean, std) and reads two empirical loss
//! quantiles off the draw set. Both quantiles come from the same draws, so the
//! 99% level is never less extreme than the 95% level.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ConfigError, MIN_SHOTS};

/// Tail probability behind VaR95.
pub const VAR95_TAIL: f64 = 0.05;

/// Tail probability behind VaR99.
pub const VAR99_TAIL: f64 = 0.01;

/// VaR levels expressed as returns (negative = loss).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VarEstimate {
    pub var95: f64,
    pub var99: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot sample Normal(mean={mean}, std_dev={std_dev})")]
    BadDistribution { mean: f64, std_dev: f64 },
}

/// Position of the `tail` quantile counted from the adverse end: `floor(shots × tail)`.
fn tail_position(shots: usize, tail: f64) -> usize {
    ((shots as f64 * tail).floor() as usize).min(shots.saturating_sub(1))
}

/// Draw `shots` samples and extract VaR95/VaR99.
///
/// Draws are ordered from most adverse to most favourable; VaR95 is the draw
/// at `floor(shots × 0.05)` and VaR99 the draw at `floor(shots × 0.01)`.
pub fn simulate_var<R: Rng + ?Sized>(
    mean: f64,
    std_dev: f64,
    shots: usize,
    rng: &mut R,
) -> Result<VarEstimate, SimulationError> {
    if shots < MIN_SHOTS {
        return Err(ConfigError::TooFewShots(shots).into());
    }
    if !mean.is_finite() || !std_dev.is_finite() {
        return Err(SimulationError::BadDistribution { mean, std_dev });
    }
    let normal =
        Normal::new(mean, std_dev).map_err(|_| SimulationError::BadDistribution { mean, std_dev })?;

    let mut draws: Vec<f64> = (0..shots).map(|_| normal.sample(&mut *rng)).collect();
    Ok(quantiles(&mut draws))
}

/// Extract VaR95/VaR99 from an unordered draw set (reorders `draws`).
///
/// Partial selection instead of a full sort: everything left of the 95%
/// position is at most as large, so the 99% position is selected inside it.
pub fn quantiles(draws: &mut [f64]) -> VarEstimate {
    let n = draws.len();
    debug_assert!(n > 0, "quantiles of an empty draw set");
    let k95 = tail_position(n, VAR95_TAIL);
    let k99 = tail_position(n, VAR99_TAIL);

    let (_, var95, _) = draws.select_nth_unstable_by(k95, f64::total_cmp);
    let var95 = *var95;
    let var99 = if k99 < k95 {
        *draws[..k95].select_nth_unstable_by(k99, f64::total_cmp).1
    } else {
        var95
    };

    VarEstimate { var95, var99 }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn quantiles_of_known_draws() {
        // 199 down to 0: position 10 → 10.0, position 2 → 2.0
        let mut draws: Vec<f64> = (0..200).rev().map(|i| i as f64).collect();
        let est = quantiles(&mut draws);
        assert_eq!(est.var95, 10.0);
        assert_eq!(est.var99, 2.0);
    }

    #[test]
    fn var99_not_above_var95() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let est = simulate_var(0.001, 0.02, 1_000, &mut rng).unwrap();
            assert!(est.var99 <= est.var95, "{est:?}");
        }
    }

    #[test]
    fn same_seed_same_estimate() {
        let a = simulate_var(0.0, 0.01, 5_000, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = simulate_var(0.0, 0.01, 5_000, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_volatility_collapses_to_mean() {
        let est = simulate_var(0.003, 0.0, 100, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(est.var95, 0.003);
        assert_eq!(est.var99, 0.003);
    }

    #[test]
    fn too_few_shots_rejected() {
        let err = simulate_var(0.0, 0.01, 99, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert_eq!(err, SimulationError::Config(ConfigError::TooFewShots(99)));
    }

    #[test]
    fn non_finite_parameters_rejected() {
        let err = simulate_var(f64::NAN, 0.01, 100, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert!(matches!(err, SimulationError::BadDistribution { .. }));
    }

    #[test]
    fn losses_for_positive_volatility() {
        let est = simulate_var(0.0, 0.02, 20_000, &mut StdRng::seed_from_u64(3)).unwrap();
        assert!(est.var95 < 0.0);
        assert!(est.var99 < est.var95);
    }
}
