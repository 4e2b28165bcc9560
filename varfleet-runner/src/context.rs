//! Per-service run state: the warmed-up pool, its start time and the last run.
//!
//! There is no global state. An orchestrator owns at most one `RunContext`,
//! created by warmup and consulted by every later operation.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use varfleet_core::{AnalysisParams, Averages, SimulationRecord, TransactionType};

use crate::aggregate::PersistedResults;
use crate::pool::{Backend, WorkerPool};

/// Parameters of one run as recorded in results and audit entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParameters {
    pub minhistory: usize,
    pub shots: usize,
    pub transaction_type: TransactionType,
    pub check_days: usize,
    pub replication: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl RunParameters {
    pub fn new(params: &AnalysisParams, replication: usize) -> Self {
        Self {
            minhistory: params.minhistory,
            shots: params.shots,
            transaction_type: params.transaction_type,
            check_days: params.check_days,
            replication,
            seed: params.seed,
        }
    }

    /// Deterministic id over the parameters and the run's start time.
    pub fn run_id(&self, started: DateTime<Utc>) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.minhistory.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(self.shots.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(self.transaction_type.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(self.check_days.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(self.replication.to_string().as_bytes());
        hasher.update(b"|");
        if let Some(seed) = self.seed {
            hasher.update(&seed.to_le_bytes());
        }
        hasher.update(b"|");
        hasher.update(started.to_rfc3339().as_bytes());
        hasher.finalize().to_hex()[..16].to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Every worker failed; nothing was persisted.
    NoResults,
}

/// Outcome of one analyse call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRun {
    pub run_id: String,
    pub parameters: RunParameters,
    pub results: Vec<SimulationRecord>,
    pub averages: Averages,
    pub status: RunStatus,
    pub failed_workers: usize,
    /// Location of the per-type result log, if anything was written.
    pub persisted_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persisted: Option<PersistedResults>,
    pub elapsed_secs: f64,
    pub cost: f64,
}

pub struct RunContext {
    pool: Box<dyn WorkerPool>,
    started_at: Instant,
    started_wall: DateTime<Utc>,
    active: bool,
    last_run: Option<AggregateRun>,
}

impl RunContext {
    pub fn new(pool: Box<dyn WorkerPool>) -> Self {
        Self {
            pool,
            started_at: Instant::now(),
            started_wall: Utc::now(),
            active: true,
            last_run: None,
        }
    }

    pub fn pool(&self) -> &dyn WorkerPool {
        self.pool.as_ref()
    }

    pub fn backend(&self) -> Backend {
        self.pool.backend()
    }

    pub fn replication(&self) -> usize {
        self.pool.size()
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn started_wall(&self) -> DateTime<Utc> {
        self.started_wall
    }

    /// Seconds since warmup. Runs are billed from pool start, not from
    /// dispatch.
    pub fn elapsed_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn last_run(&self) -> Option<&AggregateRun> {
        self.last_run.as_ref()
    }

    pub fn set_last_run(&mut self, run: AggregateRun) {
        self.last_run = Some(run);
    }

    /// Forget where results were written (after a reset).
    pub fn clear_persisted(&mut self) {
        if let Some(run) = self.last_run.as_mut() {
            run.persisted_path = None;
            run.persisted = None;
        }
    }
}
