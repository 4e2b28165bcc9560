//! Result aggregation: merge partial result sets into the persisted logs.

use serde::{Deserialize, Serialize};
use tracing::info;
use varfleet_core::{SimulationRecord, TransactionType};

use crate::store::{AppendLog, LogBlob, ResultLog, StoreError};

/// Prefix shared by every result blob.
pub const RESULTS_PREFIX: &str = "results/";

/// Union of all result sets across transaction types, in arrival order.
pub const COMBINED_RESULTS_KEY: &str = "results/combined_results.json";

/// Per-type result log key, e.g. `results/results_buy.json`.
pub fn results_key(tx: TransactionType) -> String {
    format!("{RESULTS_PREFIX}results_{}.json", tx.as_str())
}

/// Where a batch landed and how large the logs are afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedResults {
    pub type_key: String,
    pub combined_key: String,
    /// Human-readable location of the per-type log.
    pub location: String,
    pub type_total: usize,
    pub combined_total: usize,
}

#[derive(Clone)]
pub struct ResultAggregator {
    log: AppendLog,
}

impl ResultAggregator {
    pub fn new(log: AppendLog) -> Self {
        Self { log }
    }

    /// Append one batch to its per-type log, then to the combined log.
    ///
    /// The two writes are independent: a failure on the combined key leaves
    /// the per-type append in place.
    pub fn persist(
        &self,
        tx: TransactionType,
        records: &[SimulationRecord],
    ) -> Result<PersistedResults, StoreError> {
        let type_key = results_key(tx);
        let typed = self.log.append::<ResultLog>(&type_key, records)?;
        let combined = self.log.append::<ResultLog>(COMBINED_RESULTS_KEY, records)?;

        info!(
            key = %type_key,
            appended = records.len(),
            type_total = typed.items().len(),
            combined_total = combined.items().len(),
            "persisted results"
        );

        Ok(PersistedResults {
            location: self.log.store().location(&type_key),
            type_key,
            combined_key: COMBINED_RESULTS_KEY.to_string(),
            type_total: typed.items().len(),
            combined_total: combined.items().len(),
        })
    }

    /// Every record in the combined log.
    pub fn combined(&self) -> Result<Vec<SimulationRecord>, StoreError> {
        Ok(self.log.load::<ResultLog>(COMBINED_RESULTS_KEY)?.results)
    }

    /// Records of one transaction type.
    pub fn for_type(&self, tx: TransactionType) -> Result<Vec<SimulationRecord>, StoreError> {
        Ok(self.log.load::<ResultLog>(&results_key(tx))?.results)
    }

    /// Delete every result blob. The audit log lives elsewhere and survives.
    pub fn reset(&self) -> Result<usize, StoreError> {
        let store = self.log.store();
        let mut removed = 0;
        for key in store.list(RESULTS_PREFIX)? {
            if store.delete(&key)? {
                removed += 1;
            }
        }
        info!(removed, "cleared result logs");
        Ok(removed)
    }
}
