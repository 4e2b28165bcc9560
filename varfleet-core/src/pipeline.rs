//! Signal analysis pipeline: detection, window statistics, Monte Carlo VaR
//! and forward outcome composed into one record per flagged index.
//!
//! The only impurity is the Monte Carlo draw, and every signal gets its own
//! RNG from the seed hierarchy, so disjoint shards of a series can be analysed
//! independently and in any order.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{
    closes, AnalysisParams, Averages, ConfigError, PricePoint, RunningTotals, SimulationRecord,
};
use crate::montecarlo::{simulate_var, SimulationError};
use crate::outcome::forward_return;
use crate::rng::SeedHierarchy;
use crate::signal::signal_indices;
use crate::stats::{window_stats, WindowError};

/// Why a flagged index produced no record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Fewer than `minhistory + 1` prices ending at the index.
    DataInsufficient { required: usize, available: usize },
    /// A zero or non-finite price made the returns undefined.
    DataQuality { detail: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSignal {
    pub index: usize,
    pub reason: SkipReason,
}

/// Result of one pipeline pass over a series.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// One record per analysed signal, ascending by `signal_index`.
    pub records: Vec<SimulationRecord>,
    pub totals: RunningTotals,
    pub skipped: Vec<SkippedSignal>,
    /// Master seed actually used (drawn from entropy when none was given).
    pub master_seed: u64,
}

impl PipelineOutput {
    pub fn averages(&self) -> Averages {
        self.totals.averages()
    }
}

/// Analyse every flagged index of `series` for `params.transaction_type`.
///
/// Invalid parameters are rejected up front. Indices whose window cannot be
/// evaluated are skipped and reported, never fatal.
pub fn run_pipeline(
    series: &[PricePoint],
    params: &AnalysisParams,
    replica: u32,
) -> Result<PipelineOutput, ConfigError> {
    params.validate()?;

    let seeds = SeedHierarchy::resolve(params.seed);
    let tx = params.transaction_type;
    let prices = closes(series);

    let mut records = Vec::new();
    let mut totals = RunningTotals::default();
    let mut skipped = Vec::new();

    for index in signal_indices(series, tx, params.minhistory) {
        let stats = match window_stats(&prices, index, params.minhistory) {
            Ok(stats) => stats,
            Err(err) => {
                debug!(index, %err, "skipping signal");
                skipped.push(SkippedSignal {
                    index,
                    reason: skip_reason(err),
                });
                continue;
            }
        };

        let mut rng = seeds.rng_for(tx, index, replica);
        let estimate = match simulate_var(stats.mean, stats.std_dev, params.shots, &mut rng) {
            Ok(estimate) => estimate,
            Err(SimulationError::Config(err)) => return Err(err),
            Err(err @ SimulationError::BadDistribution { .. }) => {
                debug!(index, %err, "skipping signal");
                skipped.push(SkippedSignal {
                    index,
                    reason: SkipReason::DataQuality {
                        detail: err.to_string(),
                    },
                });
                continue;
            }
        };

        let record = SimulationRecord {
            signal_index: index,
            var95: estimate.var95,
            var99: estimate.var99,
            profit_loss: forward_return(&prices, index, params.check_days),
            transaction_type: tx,
        };
        totals.add(&record);
        records.push(record);
    }

    info!(
        transaction_type = %tx,
        signals = records.len(),
        skipped = skipped.len(),
        replica,
        "pipeline pass complete"
    );

    Ok(PipelineOutput {
        records,
        totals,
        skipped,
        master_seed: seeds.master_seed(),
    })
}

fn skip_reason(err: WindowError) -> SkipReason {
    match err {
        WindowError::Insufficient {
            required,
            available,
            ..
        } => SkipReason::DataInsufficient {
            required,
            available,
        },
        WindowError::BadPrice { .. } => SkipReason::DataQuality {
            detail: err.to_string(),
        },
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
