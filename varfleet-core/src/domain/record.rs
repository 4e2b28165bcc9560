//! SimulationRecord and the aggregates computed over a batch of them.

use serde::{Deserialize, Serialize};

use super::price::TransactionType;

/// VaR estimate and realized outcome for one flagged index.
///
/// Created once by the pipeline, never mutated. The `signal_date`/`type`
/// spellings produced by older workers are accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    #[serde(alias = "signal_date")]
    pub signal_index: usize,
    pub var95: f64,
    pub var99: f64,
    /// `None` when the holding period runs past the end of the series.
    pub profit_loss: Option<f64>,
    #[serde(alias = "type")]
    pub transaction_type: TransactionType,
}

/// Batch aggregates: mean VaR levels and the summed realized outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Averages {
    #[serde(alias = "average_var95")]
    pub avg_var95: f64,
    #[serde(alias = "average_var99")]
    pub avg_var99: f64,
    pub total_profit_loss: f64,
}

impl Averages {
    /// Averages over all records; zeros for an empty batch.
    pub fn from_records(records: &[SimulationRecord]) -> Self {
        let mut totals = RunningTotals::default();
        for record in records {
            totals.add(record);
        }
        totals.averages()
    }
}

/// Running sums kept while records are produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningTotals {
    pub count: usize,
    pub sum_var95: f64,
    pub sum_var99: f64,
    /// Sum over non-null outcomes only.
    pub total_profit_loss: f64,
}

impl RunningTotals {
    pub fn add(&mut self, record: &SimulationRecord) {
        self.count += 1;
        self.sum_var95 += record.var95;
        self.sum_var99 += record.var99;
        if let Some(pl) = record.profit_loss {
            self.total_profit_loss += pl;
        }
    }

    pub fn averages(&self) -> Averages {
        if self.count == 0 {
            return Averages {
                total_profit_loss: self.total_profit_loss,
                ..Averages::default()
            };
        }
        let n = self.count as f64;
        Averages {
            avg_var95: self.sum_var95 / n,
            avg_var99: self.sum_var99 / n,
            total_profit_loss: self.total_profit_loss,
        }
    }
}
