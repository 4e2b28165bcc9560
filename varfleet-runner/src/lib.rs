//! varfleet runner: fan-out dispatch, aggregation, audit and cost.
//!
//! This crate builds on `varfleet-core` to provide:
//! - Worker pools (replicated function invocations, HTTP fleet) with a
//!   failure-tolerant fan-out/fan-in
//! - An object store with conditional puts and append-only JSON logs
//! - Result aggregation into per-type and combined logs
//! - An audit trail and linear cost estimates
//! - The orchestrator tying warmup, analyse, projections and teardown together

pub mod aggregate;
pub mod audit;
pub mod config;
pub mod context;
pub mod cost;
pub mod pool;
pub mod projection;
pub mod service;
pub mod store;

pub use aggregate::{results_key, PersistedResults, ResultAggregator, COMBINED_RESULTS_KEY};
pub use audit::{AuditEntry, AuditRecorder, AUDIT_LOG_KEY};
pub use config::{ServiceConfig, ServiceConfigError};
pub use context::{AggregateRun, RunContext, RunParameters, RunStatus};
pub use cost::{CostModel, Pricing, TimeCost, WarmupCost};
pub use pool::{Backend, DispatchError, DispatchOutcome, WorkerError, WorkerPool};
pub use service::{AnalyseError, Collaborators, Orchestrator, ServiceError, WarmupReport};
pub use store::{AppendLog, FileStore, MemoryStore, ObjectStore, StoreError, WriteGuard};
