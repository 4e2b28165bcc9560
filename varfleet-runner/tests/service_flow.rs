//! End-to-end orchestrator flows against in-process collaborators.
//!
//! Tests:
//! 1. Serverless warmup → analyse → projections → audit → reset
//! 2. Fleet run where one member fails: its results are skipped, run completes
//! 3. All workers fail: NoResults run, audited, nothing persisted
//! 4. Guard rails: analyse before warmup, zero replicas, invalid parameters
//! 5. Terminate and the lifecycle queries around it
//! 6. Store failures: the computed records come back with the error

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use varfleet_core::data::{DataError, InMemorySource, PriceSource};
use varfleet_core::handler::handle_json;
use varfleet_core::{AnalysisParams, ConfigError, PricePoint, TransactionType};
use varfleet_runner::pool::{
    ComputeError, ComputeProvider, InstanceId, InstanceState, LocalInvoker, TransportReply,
    WorkerError, WorkerTransport,
};
use varfleet_runner::store::{StoreError, Version, VersionedBlob};
use varfleet_runner::{
    AnalyseError, Backend, Collaborators, MemoryStore, ObjectStore, Orchestrator, RunStatus,
    ServiceConfig, ServiceError, AUDIT_LOG_KEY, COMBINED_RESULTS_KEY,
};

// ── Helpers ──────────────────────────────────────────────────────────

/// Two years of daily prices ending today, with open/close bodies that
/// produce a mix of Buy and Sell labels.
fn market() -> InMemorySource {
    let end = Utc::now().date_naive();
    let start = end - Days::new(729);
    let points = (0..730u64)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.21).sin() * 8.0 + i as f64 * 0.02;
            let open = if i % 2 == 0 { close - 0.4 } else { close + 0.4 };
            PricePoint::new(start + Days::new(i), Some(open), close)
        })
        .collect();
    InMemorySource::new(points)
}

/// Fleet members are hosts in a fixed list; `failing` hosts answer 500.
struct MockFleet {
    hosts: Vec<String>,
    failing: Vec<String>,
    terminated: std::sync::Mutex<bool>,
}

impl MockFleet {
    fn new(hosts: &[&str], failing: &[&str]) -> Self {
        Self {
            hosts: hosts.iter().map(|s| s.to_string()).collect(),
            failing: failing.iter().map(|s| s.to_string()).collect(),
            terminated: std::sync::Mutex::new(false),
        }
    }
}

impl ComputeProvider for MockFleet {
    fn launch(&self, count: usize) -> Result<Vec<InstanceId>, ComputeError> {
        Ok(self.hosts[..count].iter().cloned().map(InstanceId).collect())
    }

    fn states(&self, ids: &[InstanceId]) -> Result<Vec<InstanceState>, ComputeError> {
        let state = if *self.terminated.lock().unwrap() {
            InstanceState::Terminated
        } else {
            InstanceState::Running
        };
        Ok(vec![state; ids.len()])
    }

    fn endpoint(&self, id: &InstanceId) -> Result<String, ComputeError> {
        Ok(format!("http://{}:5000", id.0))
    }

    fn terminate(&self, _ids: &[InstanceId]) -> Result<(), ComputeError> {
        *self.terminated.lock().unwrap() = true;
        Ok(())
    }
}

impl WorkerTransport for MockFleet {
    fn post_json(&self, url: &str, body: &[u8]) -> Result<TransportReply, WorkerError> {
        assert!(url.ends_with(":5000/analyse"), "{url}");
        if self.failing.iter().any(|h| url.starts_with(&format!("http://{h}:"))) {
            return Ok(TransportReply {
                status: 500,
                body: b"internal error".to_vec(),
            });
        }
        let response = handle_json(std::str::from_utf8(body).unwrap())
            .map_err(|e| WorkerError::Malformed(e.to_string()))?;
        Ok(TransportReply {
            status: 200,
            body: serde_json::to_vec(&response).unwrap(),
        })
    }

    fn get(&self, _url: &str) -> Result<TransportReply, WorkerError> {
        Ok(TransportReply {
            status: 200,
            body: Vec::new(),
        })
    }
}

fn orchestrator(fleet: Arc<MockFleet>) -> (Arc<MemoryStore>, Orchestrator) {
    let store = Arc::new(MemoryStore::new());
    (store.clone(), orchestrator_on(store, fleet))
}

fn orchestrator_on(store: Arc<dyn ObjectStore>, fleet: Arc<MockFleet>) -> Orchestrator {
    let collaborators = Collaborators {
        store,
        prices: Arc::new(market()),
        invoker: Arc::new(LocalInvoker),
        compute: fleet.clone(),
        transport: fleet,
    };
    Orchestrator::new(ServiceConfig::default(), collaborators)
}

fn params(tx: TransactionType, seed: u64) -> AnalysisParams {
    AnalysisParams {
        minhistory: 101,
        shots: 1_000,
        transaction_type: tx,
        check_days: 7,
        seed: Some(seed),
    }
}

// ── 1. Serverless flow ───────────────────────────────────────────────

#[test]
fn serverless_flow_persists_projects_and_audits() {
    let (store, mut orch) = orchestrator(Arc::new(MockFleet::new(&[], &[])));

    let report = orch.warmup(Backend::Serverless, 2).unwrap();
    assert!(report.ready);
    assert_eq!(report.warmup_cost.billable_secs, 2.0);
    assert!(orch.scaled_ready().unwrap());

    let buy = orch.analyse(params(TransactionType::Buy, 1)).unwrap();
    assert_eq!(buy.status, RunStatus::Completed);
    assert!(!buy.results.is_empty());
    assert_eq!(buy.results.len() % 2, 0, "two replicas, same signals");
    assert!(buy.results.iter().all(|r| r.var99 <= r.var95));
    assert_eq!(
        buy.persisted_path.as_deref(),
        Some("memory://results/results_buy.json")
    );

    let sell = orch.analyse(params(TransactionType::Sell, 2)).unwrap();
    let total = buy.results.len() + sell.results.len();

    // projections read the combined log: both runs, in arrival order
    let vars = orch.sig_var9599().unwrap();
    assert_eq!(vars.len(), total);
    assert_eq!(vars[0].signal_index, buy.results[0].signal_index);
    let pl = orch.sig_profit_loss().unwrap();
    assert_eq!(pl.len(), total);
    let expected_total: f64 = buy
        .results
        .iter()
        .chain(&sell.results)
        .filter_map(|r| r.profit_loss)
        .sum();
    assert!((orch.tot_profit_loss().unwrap() - expected_total).abs() < 1e-9);
    let (a95, a99) = orch.avg_var9599().unwrap();
    assert!(a99 <= a95);

    let time_cost = orch.time_cost().unwrap();
    assert_eq!(time_cost.elapsed_secs, sell.elapsed_secs);
    assert!(time_cost.cost >= 0.0);

    let audit = orch.audit().unwrap();
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[0].run_id, buy.run_id);
    assert_eq!(audit[1].parameters.transaction_type, TransactionType::Sell);
    assert_eq!(audit[1].parameters.replication, 2);

    // reset drops results, keeps the audit trail
    assert_eq!(orch.reset().unwrap(), 3);
    assert!(orch.sig_var9599().unwrap().is_empty());
    assert!(store.get(COMBINED_RESULTS_KEY).unwrap().is_none());
    assert!(store.get(AUDIT_LOG_KEY).unwrap().is_some());
    assert_eq!(orch.last_run().unwrap().persisted_path, None);
}

#[test]
fn seeded_runs_are_reproducible() {
    let (_, mut a) = orchestrator(Arc::new(MockFleet::new(&[], &[])));
    let (_, mut b) = orchestrator(Arc::new(MockFleet::new(&[], &[])));
    a.warmup(Backend::Serverless, 3).unwrap();
    b.warmup(Backend::Serverless, 3).unwrap();

    let ra = a.analyse(params(TransactionType::Buy, 77)).unwrap();
    let rb = b.analyse(params(TransactionType::Buy, 77)).unwrap();
    assert_eq!(ra.results, rb.results);
}

// ── 2. Fleet with a failing member ───────────────────────────────────

#[test]
fn fleet_member_failure_is_skipped() {
    let fleet = Arc::new(MockFleet::new(&["w1", "w2", "w3"], &["w2"]));
    let (_, mut orch) = orchestrator(fleet);
    let report = orch.warmup(Backend::Fleet, 3).unwrap();
    assert_eq!(report.warmup_cost.billable_secs, 3.0 * 3600.0);

    let run = orch.analyse(params(TransactionType::Buy, 5)).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.failed_workers, 1);
    assert_eq!(run.results.len() % 2, 0, "two surviving members");
    assert_eq!(orch.audit().unwrap()[0].failed_workers, 1);
}

// ── 3. Every worker fails ────────────────────────────────────────────

#[test]
fn all_workers_failing_gives_no_results_run() {
    let fleet = Arc::new(MockFleet::new(&["w1", "w2"], &["w1", "w2"]));
    let (store, mut orch) = orchestrator(fleet);
    orch.warmup(Backend::Fleet, 2).unwrap();

    let run = orch.analyse(params(TransactionType::Buy, 5)).unwrap();
    assert_eq!(run.status, RunStatus::NoResults);
    assert!(run.results.is_empty());
    assert_eq!(run.persisted_path, None);
    assert_eq!(run.averages.avg_var95, 0.0);
    assert!(store.list("results/").unwrap().is_empty());

    let audit = orch.audit().unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].status, RunStatus::NoResults);
}

// ── 4. Guard rails ───────────────────────────────────────────────────

#[test]
fn analyse_requires_warmup() {
    let (_, mut orch) = orchestrator(Arc::new(MockFleet::new(&[], &[])));
    assert!(matches!(
        orch.analyse(params(TransactionType::Buy, 1)),
        Err(AnalyseError::NotWarmedUp)
    ));
    assert!(matches!(orch.time_cost(), Err(ServiceError::NotWarmedUp)));
}

#[test]
fn time_cost_before_any_run_is_live() {
    let (_, mut orch) = orchestrator(Arc::new(MockFleet::new(&["w1", "w2"], &[])));
    orch.warmup(Backend::Fleet, 2).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));

    let first = orch.time_cost().unwrap();
    assert!(first.elapsed_secs >= 0.02);
    assert!(first.cost > 0.0);
    let expected = first.elapsed_secs / 3600.0 * 2.0 * orch.config().pricing.hourly_rate;
    assert!((first.cost - expected).abs() < 1e-12);

    let second = orch.time_cost().unwrap();
    assert!(second.elapsed_secs >= first.elapsed_secs);
}

#[test]
fn zero_replicas_rejected() {
    let (_, mut orch) = orchestrator(Arc::new(MockFleet::new(&[], &[])));
    assert!(matches!(
        orch.warmup(Backend::Serverless, 0),
        Err(ServiceError::Config(ConfigError::ZeroReplication))
    ));
}

#[test]
fn invalid_parameters_rejected_before_dispatch() {
    let (store, mut orch) = orchestrator(Arc::new(MockFleet::new(&[], &[])));
    orch.warmup(Backend::Serverless, 1).unwrap();
    let mut p = params(TransactionType::Buy, 1);
    p.shots = 50;
    assert!(matches!(
        orch.analyse(p),
        Err(AnalyseError::Config(ConfigError::TooFewShots(50)))
    ));
    assert!(store.list("").unwrap().is_empty(), "nothing written, nothing audited");
}

struct OfflineSource;

impl PriceSource for OfflineSource {
    fn name(&self) -> &str {
        "offline"
    }

    fn fetch(&self, _: &str, _: NaiveDate, _: NaiveDate) -> Result<Vec<PricePoint>, DataError> {
        Err(DataError::NetworkUnreachable("offline".into()))
    }
}

#[test]
fn price_fetch_failure_surfaces() {
    let fleet = Arc::new(MockFleet::new(&[], &[]));
    let collaborators = Collaborators {
        store: Arc::new(MemoryStore::new()),
        prices: Arc::new(OfflineSource),
        invoker: Arc::new(LocalInvoker),
        compute: fleet.clone(),
        transport: fleet,
    };
    let mut orch = Orchestrator::new(ServiceConfig::default(), collaborators);
    orch.warmup(Backend::Serverless, 1).unwrap();
    assert!(matches!(
        orch.analyse(params(TransactionType::Buy, 1)),
        Err(AnalyseError::Data(DataError::NetworkUnreachable(_)))
    ));
}

// ── 5. Terminate ─────────────────────────────────────────────────────

#[test]
fn terminate_closes_the_pool() {
    let fleet = Arc::new(MockFleet::new(&["w1", "w2"], &[]));
    let (_, mut orch) = orchestrator(fleet);
    orch.warmup(Backend::Fleet, 2).unwrap();
    assert!(!orch.scaled_terminated().unwrap());

    orch.terminate().unwrap();
    assert!(orch.scaled_terminated().unwrap());
    assert!(!orch.scaled_ready().unwrap());
    assert!(matches!(
        orch.analyse(params(TransactionType::Buy, 1)),
        Err(AnalyseError::NotWarmedUp)
    ));
}

// ── 6. Store failures ────────────────────────────────────────────────

/// In-memory store whose writes fail for keys under `failing_prefix`.
struct FailingStore {
    inner: MemoryStore,
    failing_prefix: &'static str,
}

impl FailingStore {
    fn new(failing_prefix: &'static str) -> Self {
        Self {
            inner: MemoryStore::new(),
            failing_prefix,
        }
    }

    fn check(&self, key: &str) -> Result<(), StoreError> {
        if key.starts_with(self.failing_prefix) {
            return Err(StoreError::Unreachable(format!("write to {key} refused")));
        }
        Ok(())
    }
}

impl ObjectStore for FailingStore {
    fn get(&self, key: &str) -> Result<Option<VersionedBlob>, StoreError> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<Version, StoreError> {
        self.check(key)?;
        self.inner.put(key, bytes)
    }

    fn put_if(
        &self,
        key: &str,
        bytes: &[u8],
        expected: Option<&Version>,
    ) -> Result<Version, StoreError> {
        self.check(key)?;
        self.inner.put_if(key, bytes, expected)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list(prefix)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key)
    }

    fn location(&self, key: &str) -> String {
        self.inner.location(key)
    }
}

/// Records a healthy orchestrator produces for the same seeded run.
fn expected_records(seed: u64) -> Vec<varfleet_core::SimulationRecord> {
    let (_, mut healthy) = orchestrator(Arc::new(MockFleet::new(&[], &[])));
    healthy.warmup(Backend::Serverless, 2).unwrap();
    healthy
        .analyse(params(TransactionType::Buy, seed))
        .unwrap()
        .results
}

#[test]
fn result_write_failure_returns_the_records() {
    let store = Arc::new(FailingStore::new("results/"));
    let mut orch = orchestrator_on(store.clone(), Arc::new(MockFleet::new(&[], &[])));
    orch.warmup(Backend::Serverless, 2).unwrap();

    let err = orch.analyse(params(TransactionType::Buy, 31)).unwrap_err();
    let AnalyseError::Persistence { source, records } = err else {
        panic!("expected a persistence error, got {err:?}");
    };
    assert!(matches!(source, StoreError::Unreachable(_)));
    assert!(!records.is_empty());
    assert_eq!(records, expected_records(31));

    // a failed run is not audited and leaves no last run behind
    assert!(orch.audit().unwrap().is_empty());
    assert!(orch.last_run().is_none());
}

#[test]
fn audit_write_failure_returns_the_records() {
    let store = Arc::new(FailingStore::new("audit/"));
    let mut orch = orchestrator_on(store.clone(), Arc::new(MockFleet::new(&[], &[])));
    orch.warmup(Backend::Serverless, 2).unwrap();

    let err = orch.analyse(params(TransactionType::Buy, 32)).unwrap_err();
    let AnalyseError::Persistence { source, records } = err else {
        panic!("expected a persistence error, got {err:?}");
    };
    assert!(matches!(source, StoreError::Unreachable(_)));
    assert_eq!(records, expected_records(32));

    // results were written before the audit append failed
    assert_eq!(orch.sig_var9599().unwrap().len(), records.len());
    assert!(store.get(AUDIT_LOG_KEY).unwrap().is_none());
}
