//! Replicated function invocations.
//!
//! The same request goes to one function `r` times. Every invocation runs the
//! full pipeline with its own draws, so the batch holds `r` independent
//! resamplings of the same signals, not a partition of them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::info;
use varfleet_core::domain::InvocationEnvelope;
use varfleet_core::handler::handle_invocation;
use varfleet_core::AnalysisRequest;

use super::{
    fan_out, parse_worker_reply, Backend, DispatchError, DispatchOutcome, WorkerError, WorkerPool,
};

/// Invokes a named function synchronously and returns its raw reply.
pub trait FunctionInvoker: Send + Sync {
    fn function_exists(&self, name: &str) -> Result<bool, WorkerError>;

    fn invoke(&self, name: &str, payload: &[u8]) -> Result<Vec<u8>, WorkerError>;
}

/// Runs the worker handler in-process. Every invocation still goes through
/// JSON, exactly as a remote one would.
#[derive(Debug, Clone, Default)]
pub struct LocalInvoker;

impl FunctionInvoker for LocalInvoker {
    fn function_exists(&self, _name: &str) -> Result<bool, WorkerError> {
        Ok(true)
    }

    fn invoke(&self, _name: &str, payload: &[u8]) -> Result<Vec<u8>, WorkerError> {
        let input = std::str::from_utf8(payload)
            .map_err(|e| WorkerError::Malformed(format!("payload is not UTF-8: {e}")))?;
        let envelope = handle_invocation(input);
        serde_json::to_vec(&envelope).map_err(|e| WorkerError::Malformed(e.to_string()))
    }
}

/// Function exposed at an HTTP URL; the payload is POSTed as JSON.
pub struct HttpInvoker {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpInvoker {
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, WorkerError> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| WorkerError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl FunctionInvoker for HttpInvoker {
    /// A function URL is addressed directly; existence is only known on invoke.
    fn function_exists(&self, _name: &str) -> Result<bool, WorkerError> {
        Ok(!self.url.is_empty())
    }

    fn invoke(&self, _name: &str, payload: &[u8]) -> Result<Vec<u8>, WorkerError> {
        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .map_err(|e| WorkerError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(WorkerError::Status {
                status: status.as_u16(),
            });
        }
        resp.bytes()
            .map(|b| b.to_vec())
            .map_err(|e| WorkerError::Transport(e.to_string()))
    }
}

/// Unwrap a `{"statusCode", "body"}` reply; bare bodies pass through.
pub fn unwrap_envelope(reply: &[u8]) -> Result<Vec<u8>, WorkerError> {
    let value: Value =
        serde_json::from_slice(reply).map_err(|e| WorkerError::Malformed(e.to_string()))?;
    if value.get("statusCode").is_none() {
        return Ok(reply.to_vec());
    }
    let envelope: InvocationEnvelope =
        serde_json::from_value(value).map_err(|e| WorkerError::Malformed(e.to_string()))?;
    if envelope.status_code != 200 {
        return Err(WorkerError::Status {
            status: envelope.status_code,
        });
    }
    Ok(envelope.body.into_bytes())
}

pub struct ServerlessPool {
    invoker: Arc<dyn FunctionInvoker>,
    function_name: String,
    replicas: usize,
    parallel: bool,
    terminated: AtomicBool,
}

impl ServerlessPool {
    /// Check that the function exists and size the pool at `replicas`.
    pub fn provision(
        invoker: Arc<dyn FunctionInvoker>,
        function_name: impl Into<String>,
        replicas: usize,
        parallel: bool,
    ) -> Result<Self, WorkerError> {
        let function_name = function_name.into();
        if !invoker.function_exists(&function_name)? {
            return Err(WorkerError::Unavailable(format!(
                "function '{function_name}' does not exist"
            )));
        }
        info!(function = %function_name, replicas, "serverless pool ready");
        Ok(Self {
            invoker,
            function_name,
            replicas,
            parallel,
            terminated: AtomicBool::new(false),
        })
    }
}

impl WorkerPool for ServerlessPool {
    fn backend(&self) -> Backend {
        Backend::Serverless
    }

    fn size(&self) -> usize {
        self.replicas
    }

    fn is_ready(&self) -> Result<bool, DispatchError> {
        Ok(!self.terminated.load(Ordering::SeqCst) && self.replicas > 0)
    }

    fn dispatch(&self, request: &AnalysisRequest) -> Result<DispatchOutcome, DispatchError> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(DispatchError::Terminated);
        }
        if self.replicas == 0 {
            return Err(DispatchError::EmptyPool);
        }
        let payloads = (0..self.replicas)
            .map(|k| serde_json::to_vec(&request.for_replica(k as u32)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(DispatchError::Encode)?;

        Ok(fan_out(self.replicas, self.parallel, |k| {
            let reply = self.invoker.invoke(&self.function_name, &payloads[k])?;
            parse_worker_reply(&unwrap_envelope(&reply)?)
        }))
    }

    /// Functions hold no standing capacity; terminating only closes the pool.
    fn terminate(&self) -> Result<(), DispatchError> {
        self.terminated.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_terminated(&self) -> Result<bool, DispatchError> {
        Ok(self.terminated.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use varfleet_core::domain::{AnalysisParams, PricePoint, TransactionType};

    fn request(seed: u64) -> AnalysisRequest {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let data = (0..40)
            .map(|i| {
                let close = 50.0 + (i as f64 * 0.5).sin();
                let mut p = PricePoint::new(start + chrono::Days::new(i), None, close);
                p.sell = i % 6 == 0;
                p
            })
            .collect();
        AnalysisRequest::new(
            data,
            AnalysisParams {
                minhistory: 10,
                shots: 500,
                transaction_type: TransactionType::Sell,
                check_days: 4,
                seed: Some(seed),
            },
        )
    }

    #[test]
    fn replicas_resample_the_same_signals() {
        let pool = ServerlessPool::provision(Arc::new(LocalInvoker), "analyse", 3, true).unwrap();
        let outcome = pool.dispatch(&request(2)).unwrap();

        // indices 12, 18, 24, 30, 36 per replica
        assert_eq!(outcome.records.len(), 15);
        assert_eq!(outcome.succeeded, 3);
        let first: Vec<usize> = outcome.records[..5].iter().map(|r| r.signal_index).collect();
        let second: Vec<usize> = outcome.records[5..10].iter().map(|r| r.signal_index).collect();
        assert_eq!(first, second);
        assert_ne!(outcome.records[0].var95, outcome.records[5].var95);
    }

    #[test]
    fn seeded_dispatch_is_reproducible() {
        let pool = ServerlessPool::provision(Arc::new(LocalInvoker), "analyse", 2, true).unwrap();
        let a = pool.dispatch(&request(9)).unwrap();
        let b = pool.dispatch(&request(9)).unwrap();
        assert_eq!(a.records, b.records);
    }

    #[test]
    fn error_envelope_is_worker_failure() {
        let reply = serde_json::to_vec(&InvocationEnvelope::error(500, "boom")).unwrap();
        assert!(matches!(
            unwrap_envelope(&reply),
            Err(WorkerError::Status { status: 500 })
        ));
    }

    #[test]
    fn terminated_pool_refuses_dispatch() {
        let pool = ServerlessPool::provision(Arc::new(LocalInvoker), "analyse", 1, false).unwrap();
        pool.terminate().unwrap();
        assert!(pool.is_terminated().unwrap());
        assert!(matches!(pool.dispatch(&request(1)), Err(DispatchError::Terminated)));
    }

    struct MissingFunction;

    impl FunctionInvoker for MissingFunction {
        fn function_exists(&self, _name: &str) -> Result<bool, WorkerError> {
            Ok(false)
        }

        fn invoke(&self, _name: &str, _payload: &[u8]) -> Result<Vec<u8>, WorkerError> {
            unreachable!("never invoked")
        }
    }

    #[test]
    fn provisioning_checks_function_exists() {
        let err = ServerlessPool::provision(Arc::new(MissingFunction), "nope", 2, false);
        assert!(matches!(err, Err(WorkerError::Unavailable(_))));
    }
}
