//! Read-only views over a persisted result set.

use serde::{Deserialize, Serialize};
use varfleet_core::{Averages, SimulationRecord};

/// VaR levels of one signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalVar {
    pub signal_index: usize,
    pub var95: f64,
    pub var99: f64,
}

/// Realized outcome of one signal (`None` past the series end).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalProfitLoss {
    pub signal_index: usize,
    pub profit_loss: Option<f64>,
}

/// VaR95/VaR99 per signal, in stored order.
pub fn sig_var9599(records: &[SimulationRecord]) -> Vec<SignalVar> {
    records
        .iter()
        .map(|r| SignalVar {
            signal_index: r.signal_index,
            var95: r.var95,
            var99: r.var99,
        })
        .collect()
}

/// Mean VaR95 and VaR99 across the set; zeros when empty.
pub fn avg_var9599(records: &[SimulationRecord]) -> (f64, f64) {
    let averages = Averages::from_records(records);
    (averages.avg_var95, averages.avg_var99)
}

pub fn sig_profit_loss(records: &[SimulationRecord]) -> Vec<SignalProfitLoss> {
    records
        .iter()
        .map(|r| SignalProfitLoss {
            signal_index: r.signal_index,
            profit_loss: r.profit_loss,
        })
        .collect()
}

/// Sum of non-null outcomes.
pub fn tot_profit_loss(records: &[SimulationRecord]) -> f64 {
    records.iter().filter_map(|r| r.profit_loss).sum()
}
