//! Cost estimates: linear pricing models per backend.
//!
//! Estimates only; no attempt is made to reproduce a provider's billing
//! granularity.

use serde::{Deserialize, Serialize};

use crate::pool::Backend;

/// Hourly rate of one fleet member.
pub const DEFAULT_HOURLY_RATE: f64 = 0.0134;

/// Memory allotted to one function invocation, in GB.
pub const DEFAULT_MEMORY_GB: f64 = 1.0;

/// Price per GB-second of function execution.
pub const DEFAULT_UNIT_PRICE: f64 = 0.000_016_666_7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pricing {
    pub hourly_rate: f64,
    pub memory_gb: f64,
    pub unit_price: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            hourly_rate: DEFAULT_HOURLY_RATE,
            memory_gb: DEFAULT_MEMORY_GB,
            unit_price: DEFAULT_UNIT_PRICE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum CostModel {
    ElasticFleet { hourly_rate: f64 },
    Serverless { memory_gb: f64, unit_price: f64 },
}

/// Billable time and cost of bringing a pool up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WarmupCost {
    pub billable_secs: f64,
    pub cost: f64,
}

/// Elapsed time and estimated cost of the last run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeCost {
    pub elapsed_secs: f64,
    pub cost: f64,
}

impl CostModel {
    pub fn for_backend(backend: Backend, pricing: &Pricing) -> Self {
        match backend {
            Backend::Fleet => CostModel::ElasticFleet {
                hourly_rate: pricing.hourly_rate,
            },
            Backend::Serverless => CostModel::Serverless {
                memory_gb: pricing.memory_gb,
                unit_price: pricing.unit_price,
            },
        }
    }

    /// Cost of `workers` running for `elapsed_secs`.
    ///
    /// Fleet: `(elapsed / 3600) × workers × hourly_rate`.
    /// Serverless: `workers × memory_gb × elapsed × unit_price`.
    pub fn estimate(&self, elapsed_secs: f64, workers: usize) -> f64 {
        let workers = workers as f64;
        let elapsed = elapsed_secs.max(0.0);
        match *self {
            CostModel::ElasticFleet { hourly_rate } => elapsed / 3600.0 * workers * hourly_rate,
            CostModel::Serverless {
                memory_gb,
                unit_price,
            } => workers * memory_gb * elapsed * unit_price,
        }
    }

    /// Minimum billing for bringing `workers` up: one hour per fleet member,
    /// one second per function replica.
    pub fn warmup_estimate(&self, workers: usize) -> WarmupCost {
        let billable_secs = match self {
            CostModel::ElasticFleet { .. } => workers as f64 * 3600.0,
            CostModel::Serverless { .. } => workers as f64,
        };
        let per_worker_secs = billable_secs / workers.max(1) as f64;
        WarmupCost {
            billable_secs,
            cost: self.estimate(per_worker_secs, workers),
        }
    }
}
