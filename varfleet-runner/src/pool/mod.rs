//! Worker pools and the fan-out/fan-in dispatch around them.
//!
//! A pool sends one analysis request to each of its workers and concatenates
//! whatever comes back, in worker order. A failed worker is logged and
//! skipped; it never aborts the batch and is never retried.

pub mod fleet;
pub mod serverless;

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use varfleet_core::{AnalysisRequest, SimulationRecord};

pub use fleet::{
    ComputeError, ComputeProvider, FleetPool, HttpTransport, InstanceId, InstanceState,
    StaticFleet, TransportReply, WorkerTransport,
};
pub use serverless::{FunctionInvoker, HttpInvoker, LocalInvoker, ServerlessPool};

/// Which kind of worker pool executes a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Replicated function invocations.
    #[serde(alias = "lambda")]
    Serverless,
    /// Long-running HTTP workers.
    #[serde(alias = "ec2")]
    Fleet,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Serverless => "serverless",
            Backend::Fleet => "fleet",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown backend '{0}' (expected serverless or fleet)")]
pub struct UnknownBackend(pub String);

impl FromStr for Backend {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serverless" | "lambda" => Ok(Backend::Serverless),
            "fleet" | "ec2" => Ok(Backend::Fleet),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

/// Why one worker's partial result set was dropped.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker answered with status {status}")]
    Status { status: u16 },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed worker reply: {0}")]
    Malformed(String),

    #[error("worker unavailable: {0}")]
    Unavailable(String),
}

/// Failures that stop a batch before any worker is contacted.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("fleet not ready: {running} of {total} members running")]
    FleetNotReady { running: usize, total: usize },

    #[error("worker pool is empty")]
    EmptyPool,

    #[error("worker pool has been terminated")]
    Terminated,

    #[error("failed to encode request")]
    Encode(#[source] serde_json::Error),

    #[error("status poll failed")]
    StatusPoll(#[from] ComputeError),
}

#[derive(Debug)]
pub struct WorkerFailure {
    pub worker: usize,
    pub error: WorkerError,
}

/// Joined output of one batch.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Concatenation of successful partial result sets, in worker order.
    pub records: Vec<SimulationRecord>,
    pub succeeded: usize,
    pub failures: Vec<WorkerFailure>,
}

impl DispatchOutcome {
    pub fn all_failed(&self) -> bool {
        self.succeeded == 0
    }
}

/// A set of workers able to run one analysis request each.
pub trait WorkerPool: Send + Sync {
    fn backend(&self) -> Backend;

    /// Number of workers (the replication factor).
    fn size(&self) -> usize;

    /// Whether every worker can take requests right now.
    fn is_ready(&self) -> Result<bool, DispatchError>;

    /// Run `request` on every worker and join the partial results.
    fn dispatch(&self, request: &AnalysisRequest) -> Result<DispatchOutcome, DispatchError>;

    /// Release the workers. Idempotent.
    fn terminate(&self) -> Result<(), DispatchError>;

    fn is_terminated(&self) -> Result<bool, DispatchError>;
}

/// Call `work` for workers `0..count` and join in worker order.
///
/// With `parallel` the calls run on the rayon pool; the collect is the join
/// barrier. Errors are logged and recorded, never propagated.
pub fn fan_out<F>(count: usize, parallel: bool, work: F) -> DispatchOutcome
where
    F: Fn(usize) -> Result<Vec<SimulationRecord>, WorkerError> + Sync,
{
    let replies: Vec<Result<Vec<SimulationRecord>, WorkerError>> = if parallel {
        (0..count).into_par_iter().map(&work).collect()
    } else {
        (0..count).map(&work).collect()
    };

    let mut outcome = DispatchOutcome::default();
    for (worker, reply) in replies.into_iter().enumerate() {
        match reply {
            Ok(records) => {
                debug!(worker, records = records.len(), "worker finished");
                outcome.records.extend(records);
                outcome.succeeded += 1;
            }
            Err(error) => {
                warn!(worker, %error, "worker failed, skipping its results");
                outcome.failures.push(WorkerFailure { worker, error });
            }
        }
    }
    outcome
}

/// Decode a worker body. A body without a `results` list is malformed.
pub fn parse_worker_reply(body: &[u8]) -> Result<Vec<SimulationRecord>, WorkerError> {
    let mut value: Value =
        serde_json::from_slice(body).map_err(|e| WorkerError::Malformed(e.to_string()))?;
    let results = value
        .get_mut("results")
        .map(Value::take)
        .ok_or_else(|| WorkerError::Malformed("missing 'results'".into()))?;
    serde_json::from_value(results).map_err(|e| WorkerError::Malformed(e.to_string()))
}

// ─── Tests ───────────────────────────────────────────────────────────
