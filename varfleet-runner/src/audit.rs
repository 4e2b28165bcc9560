//! Audit trail: one immutable entry per run, appended to a JSON array.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use varfleet_core::Averages;

use crate::context::{AggregateRun, RunParameters, RunStatus};
use crate::pool::Backend;
use crate::store::{AppendLog, StoreError};

pub const AUDIT_LOG_KEY: &str = "audit/audit_log.json";

/// Snapshot of one run's parameters, aggregates and cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub backend: Backend,
    pub parameters: RunParameters,
    pub averages: Averages,
    pub record_count: usize,
    pub failed_workers: usize,
    pub status: RunStatus,
    pub elapsed_secs: f64,
    pub cost: f64,
    pub persisted_path: Option<String>,
}

impl AuditEntry {
    pub fn from_run(run: &AggregateRun, backend: Backend, timestamp: DateTime<Utc>) -> Self {
        Self {
            run_id: run.run_id.clone(),
            timestamp,
            backend,
            parameters: run.parameters.clone(),
            averages: run.averages,
            record_count: run.results.len(),
            failed_workers: run.failed_workers,
            status: run.status,
            elapsed_secs: run.elapsed_secs,
            cost: run.cost,
            persisted_path: run.persisted_path.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuditRecorder {
    log: AppendLog,
}

impl AuditRecorder {
    pub fn new(log: AppendLog) -> Self {
        Self { log }
    }

    /// Append `entry`. Existing entries are never rewritten.
    pub fn record(&self, entry: &AuditEntry) -> Result<usize, StoreError> {
        let all = self
            .log
            .append::<Vec<AuditEntry>>(AUDIT_LOG_KEY, std::slice::from_ref(entry))?;
        info!(run_id = %entry.run_id, status = ?entry.status, entries = all.len(), "audited run");
        Ok(all.len())
    }

    /// Every entry, oldest first.
    pub fn entries(&self) -> Result<Vec<AuditEntry>, StoreError> {
        self.log.load::<Vec<AuditEntry>>(AUDIT_LOG_KEY)
    }
}
