//! Orchestrator: the logical service surface around a worker pool.
//!
//! Lifecycle: `warmup` creates the pool and the run context; `analyse` runs a
//! batch, persists it and appends an audit entry; the projections read the
//! combined result log; `reset` clears results; `terminate` releases the pool.

use std::sync::Arc;

use chrono::{Days, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use varfleet_core::data::{CsvSource, DataError, PriceSource, YahooSource};
use varfleet_core::signal::label_signals;
use varfleet_core::{
    AnalysisParams, AnalysisRequest, Averages, ConfigError, PricePoint, SimulationRecord,
};

use crate::aggregate::ResultAggregator;
use crate::audit::{AuditEntry, AuditRecorder};
use crate::config::ServiceConfig;
use crate::context::{AggregateRun, RunContext, RunParameters, RunStatus};
use crate::cost::{CostModel, TimeCost, WarmupCost};
use crate::pool::{
    Backend, ComputeProvider, DispatchError, FleetPool, FunctionInvoker, HttpInvoker,
    HttpTransport, LocalInvoker, ServerlessPool, StaticFleet, WorkerError, WorkerPool,
    WorkerTransport,
};
use crate::projection::{self, SignalProfitLoss, SignalVar};
use crate::store::{AppendLog, FileStore, ObjectStore, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no worker pool: call warmup first")]
    NotWarmedUp,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("worker pool provisioning failed")]
    Provision(#[source] WorkerError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("store failure")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Data(#[from] DataError),
}

#[derive(Debug, Error)]
pub enum AnalyseError {
    #[error("no active worker pool: call warmup first")]
    NotWarmedUp,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("price fetch failed")]
    Data(#[from] DataError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The batch ran but could not be written; its records are kept here.
    #[error("failed to persist {} records", records.len())]
    Persistence {
        #[source]
        source: StoreError,
        records: Vec<SimulationRecord>,
    },
}

/// External collaborators the orchestrator is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ObjectStore>,
    pub prices: Arc<dyn PriceSource>,
    pub invoker: Arc<dyn FunctionInvoker>,
    pub compute: Arc<dyn ComputeProvider>,
    pub transport: Arc<dyn WorkerTransport>,
}

impl Collaborators {
    /// Production wiring: file store, CSV or Yahoo prices, HTTP workers.
    /// Without a function URL the serverless backend runs in-process.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let timeout = config.dispatch.timeout();
        let transport: Arc<dyn WorkerTransport> =
            Arc::new(HttpTransport::new(timeout).map_err(ServiceError::Provision)?);
        let prices: Arc<dyn PriceSource> = match &config.market.csv_path {
            Some(path) => Arc::new(CsvSource::new(path)),
            None => Arc::new(YahooSource::new()?),
        };
        let invoker: Arc<dyn FunctionInvoker> = match &config.serverless.url {
            Some(url) => Arc::new(HttpInvoker::new(url, timeout).map_err(ServiceError::Provision)?),
            None => Arc::new(LocalInvoker),
        };
        Ok(Self {
            store: Arc::new(FileStore::new(&config.store.root)),
            prices,
            invoker,
            compute: Arc::new(StaticFleet::new(
                config.fleet.hosts.clone(),
                config.fleet.port,
                transport.clone(),
            )),
            transport,
        })
    }
}

/// What warmup produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupReport {
    pub backend: Backend,
    pub replicas: usize,
    pub ready: bool,
    pub warmup_cost: WarmupCost,
}

pub struct Orchestrator {
    config: ServiceConfig,
    collaborators: Collaborators,
    aggregator: ResultAggregator,
    audit: AuditRecorder,
    context: Option<RunContext>,
}

impl Orchestrator {
    pub fn new(config: ServiceConfig, collaborators: Collaborators) -> Self {
        let log = AppendLog::new(collaborators.store.clone(), config.store.write_guard);
        Self {
            aggregator: ResultAggregator::new(log.clone()),
            audit: AuditRecorder::new(log),
            config,
            collaborators,
            context: None,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn context(&self) -> Result<&RunContext, ServiceError> {
        self.context.as_ref().ok_or(ServiceError::NotWarmedUp)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Provision a pool of `replicas` workers and start the run clock.
    ///
    /// An earlier pool that is still active is terminated first.
    pub fn warmup(&mut self, backend: Backend, replicas: usize) -> Result<WarmupReport, ServiceError> {
        if replicas == 0 {
            return Err(ConfigError::ZeroReplication.into());
        }
        if let Some(old) = self.context.as_mut().filter(|c| c.is_active()) {
            if let Err(e) = old.pool().terminate() {
                warn!(error = %e, "failed to release previous pool");
            }
            old.deactivate();
        }

        let parallel = self.config.dispatch.parallel;
        let pool: Box<dyn WorkerPool> = match backend {
            Backend::Serverless => Box::new(
                ServerlessPool::provision(
                    self.collaborators.invoker.clone(),
                    self.config.serverless.function_name.clone(),
                    replicas,
                    parallel,
                )
                .map_err(ServiceError::Provision)?,
            ),
            Backend::Fleet => Box::new(FleetPool::launch(
                self.collaborators.compute.clone(),
                self.collaborators.transport.clone(),
                replicas,
                parallel,
            )?),
        };
        let ready = pool.is_ready()?;
        let warmup_cost =
            CostModel::for_backend(backend, &self.config.pricing).warmup_estimate(replicas);
        info!(%backend, replicas, ready, "warmed up");

        self.context = Some(RunContext::new(pool));
        Ok(WarmupReport {
            backend,
            replicas,
            ready,
            warmup_cost,
        })
    }

    /// Whether every worker of the pool can take requests.
    pub fn scaled_ready(&self) -> Result<bool, ServiceError> {
        let context = self.context()?;
        Ok(context.is_active() && context.pool().is_ready()?)
    }

    /// Minimum billing for the current pool.
    pub fn warmup_cost(&self) -> Result<WarmupCost, ServiceError> {
        let context = self.context()?;
        Ok(CostModel::for_backend(context.backend(), &self.config.pricing)
            .warmup_estimate(context.replication()))
    }

    /// Release the pool. Later analyses need a new warmup.
    pub fn terminate(&mut self) -> Result<(), ServiceError> {
        let context = self.context.as_mut().ok_or(ServiceError::NotWarmedUp)?;
        context.pool().terminate()?;
        context.deactivate();
        info!(backend = %context.backend(), "pool terminated");
        Ok(())
    }

    pub fn scaled_terminated(&self) -> Result<bool, ServiceError> {
        Ok(self.context()?.pool().is_terminated()?)
    }

    // ── Runs ─────────────────────────────────────────────────────────

    /// Fetch the configured symbol's history, label it and run a batch.
    pub fn analyse(&mut self, params: AnalysisParams) -> Result<AggregateRun, AnalyseError> {
        if !self.context.as_ref().is_some_and(RunContext::is_active) {
            return Err(AnalyseError::NotWarmedUp);
        }
        params.validate()?;
        let series = self.fetch_series()?;
        self.analyse_series(series, params)
    }

    fn fetch_series(&self) -> Result<Vec<PricePoint>, DataError> {
        let market = &self.config.market;
        let end = Utc::now().date_naive();
        let start = end
            .checked_sub_days(Days::new(market.lookback_days))
            .unwrap_or(end);
        let mut series = self
            .collaborators
            .prices
            .fetch(&market.symbol, start, end)?;
        label_signals(&mut series, market.body_threshold);
        info!(
            source = self.collaborators.prices.name(),
            symbol = %market.symbol,
            points = series.len(),
            "fetched prices"
        );
        Ok(series)
    }

    /// Run a batch over an already flagged series.
    ///
    /// A batch where every worker failed is still audited, with status
    /// `NoResults`, but writes nothing to the result logs.
    pub fn analyse_series(
        &mut self,
        series: Vec<PricePoint>,
        params: AnalysisParams,
    ) -> Result<AggregateRun, AnalyseError> {
        let context = match self.context.as_mut() {
            Some(c) if c.is_active() => c,
            _ => return Err(AnalyseError::NotWarmedUp),
        };
        params.validate()?;

        let backend = context.backend();
        let replication = context.replication();
        let tx = params.transaction_type;
        let parameters = RunParameters::new(&params, replication);
        let run_started = Utc::now();
        let run_id = parameters.run_id(run_started);
        info!(%run_id, %backend, replication, transaction_type = %tx, "starting run");

        let request = AnalysisRequest::new(series, params);
        let outcome = context.pool().dispatch(&request)?;
        let failed_workers = outcome.failures.len();
        let records = outcome.records;
        let averages = Averages::from_records(&records);

        let (status, persisted) = if records.is_empty() {
            warn!(%run_id, failed_workers, "no results from any worker");
            (RunStatus::NoResults, None)
        } else {
            match self.aggregator.persist(tx, &records) {
                Ok(p) => (RunStatus::Completed, Some(p)),
                Err(source) => {
                    error!(%run_id, error = %source, "failed to persist results");
                    return Err(AnalyseError::Persistence { source, records });
                }
            }
        };

        let elapsed_secs = context.elapsed_secs();
        let cost = CostModel::for_backend(backend, &self.config.pricing)
            .estimate(elapsed_secs, replication);

        let run = AggregateRun {
            run_id,
            parameters,
            results: records,
            averages,
            status,
            failed_workers,
            persisted_path: persisted.as_ref().map(|p| p.location.clone()),
            persisted,
            elapsed_secs,
            cost,
        };

        let entry = AuditEntry::from_run(&run, backend, run_started);
        if let Err(source) = self.audit.record(&entry) {
            error!(run_id = %run.run_id, error = %source, "failed to append audit entry");
            return Err(AnalyseError::Persistence {
                source,
                records: run.results,
            });
        }

        info!(
            run_id = %run.run_id,
            records = run.results.len(),
            elapsed_secs,
            cost,
            "run complete"
        );
        context.set_last_run(run.clone());
        Ok(run)
    }

    pub fn last_run(&self) -> Option<&AggregateRun> {
        self.context.as_ref().and_then(RunContext::last_run)
    }

    // ── Projections ──────────────────────────────────────────────────

    pub fn sig_var9599(&self) -> Result<Vec<SignalVar>, ServiceError> {
        Ok(projection::sig_var9599(&self.aggregator.combined()?))
    }

    pub fn avg_var9599(&self) -> Result<(f64, f64), ServiceError> {
        Ok(projection::avg_var9599(&self.aggregator.combined()?))
    }

    pub fn sig_profit_loss(&self) -> Result<Vec<SignalProfitLoss>, ServiceError> {
        Ok(projection::sig_profit_loss(&self.aggregator.combined()?))
    }

    pub fn tot_profit_loss(&self) -> Result<f64, ServiceError> {
        Ok(projection::tot_profit_loss(&self.aggregator.combined()?))
    }

    // ── Observability ────────────────────────────────────────────────

    /// Elapsed time and cost of the last run; before any run, the time
    /// since warmup and what the pool has cost so far.
    pub fn time_cost(&self) -> Result<TimeCost, ServiceError> {
        let context = self.context()?;
        if let Some(run) = context.last_run() {
            return Ok(TimeCost {
                elapsed_secs: run.elapsed_secs,
                cost: run.cost,
            });
        }
        let elapsed_secs = context.elapsed_secs();
        Ok(TimeCost {
            elapsed_secs,
            cost: CostModel::for_backend(context.backend(), &self.config.pricing)
                .estimate(elapsed_secs, context.replication()),
        })
    }

    pub fn audit(&self) -> Result<Vec<AuditEntry>, ServiceError> {
        Ok(self.audit.entries()?)
    }

    /// Delete all result logs. The audit log is kept.
    pub fn reset(&mut self) -> Result<usize, ServiceError> {
        let removed = self.aggregator.reset()?;
        if let Some(context) = self.context.as_mut() {
            context.clear_persisted();
        }
        Ok(removed)
    }
}
