//! Elastic fleet of long-running HTTP workers.
//!
//! Provisioning and state polling go through a [`ComputeProvider`]; requests
//! go through a [`WorkerTransport`]. The fleet is only used when every member
//! reports running in a poll taken right before dispatch.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use varfleet_core::AnalysisRequest;

use super::{
    fan_out, parse_worker_reply, Backend, DispatchError, DispatchOutcome, WorkerError, WorkerPool,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("compute provider: {0}")]
pub struct ComputeError(pub String);

/// Provisions fleet members and reports their state.
pub trait ComputeProvider: Send + Sync {
    fn launch(&self, count: usize) -> Result<Vec<InstanceId>, ComputeError>;

    /// State of each id, in the order given.
    fn states(&self, ids: &[InstanceId]) -> Result<Vec<InstanceState>, ComputeError>;

    /// Base URL of a member, e.g. `http://10.0.0.5:5000`.
    fn endpoint(&self, id: &InstanceId) -> Result<String, ComputeError>;

    fn terminate(&self, ids: &[InstanceId]) -> Result<(), ComputeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Synchronous HTTP used to reach fleet members.
pub trait WorkerTransport: Send + Sync {
    fn post_json(&self, url: &str, body: &[u8]) -> Result<TransportReply, WorkerError>;

    fn get(&self, url: &str) -> Result<TransportReply, WorkerError>;
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Option<Duration>) -> Result<Self, WorkerError> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| WorkerError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn finish(resp: reqwest::blocking::Response) -> Result<TransportReply, WorkerError> {
        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .map_err(|e| WorkerError::Transport(e.to_string()))?
            .to_vec();
        Ok(TransportReply { status, body })
    }
}

impl WorkerTransport for HttpTransport {
    fn post_json(&self, url: &str, body: &[u8]) -> Result<TransportReply, WorkerError> {
        let resp = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .map_err(|e| WorkerError::Transport(e.to_string()))?;
        Self::finish(resp)
    }

    fn get(&self, url: &str) -> Result<TransportReply, WorkerError> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| WorkerError::Transport(e.to_string()))?;
        Self::finish(resp)
    }
}

/// A fixed set of already-running hosts treated as a fleet.
///
/// `launch` hands out the first `count` hosts; a member is running when it
/// answers a health check on its port, and terminated once released.
pub struct StaticFleet {
    hosts: Vec<String>,
    port: u16,
    transport: Arc<dyn WorkerTransport>,
    released: Mutex<HashSet<InstanceId>>,
}

impl StaticFleet {
    pub const DEFAULT_PORT: u16 = 5000;

    pub fn new(hosts: Vec<String>, port: u16, transport: Arc<dyn WorkerTransport>) -> Self {
        Self {
            hosts,
            port,
            transport,
            released: Mutex::new(HashSet::new()),
        }
    }

    fn released(&self) -> Result<std::sync::MutexGuard<'_, HashSet<InstanceId>>, ComputeError> {
        self.released
            .lock()
            .map_err(|_| ComputeError("fleet state lock poisoned".into()))
    }
}

impl ComputeProvider for StaticFleet {
    fn launch(&self, count: usize) -> Result<Vec<InstanceId>, ComputeError> {
        if count > self.hosts.len() {
            return Err(ComputeError(format!(
                "{count} members requested, only {} hosts configured",
                self.hosts.len()
            )));
        }
        let ids: Vec<InstanceId> = self.hosts[..count]
            .iter()
            .map(|h| InstanceId(h.clone()))
            .collect();
        let mut released = self.released()?;
        for id in &ids {
            released.remove(id);
        }
        Ok(ids)
    }

    fn states(&self, ids: &[InstanceId]) -> Result<Vec<InstanceState>, ComputeError> {
        // Snapshot so a slow health check never blocks `terminate`.
        let released = self.released()?.clone();
        ids.iter()
            .map(|id| {
                if released.contains(id) {
                    return Ok(InstanceState::Terminated);
                }
                let url = format!("{}/", self.endpoint(id)?);
                Ok(match self.transport.get(&url) {
                    Ok(reply) if reply.is_success() => InstanceState::Running,
                    Ok(reply) => {
                        debug!(instance = %id, status = reply.status, "health check answered with failure");
                        InstanceState::Pending
                    }
                    Err(e) => {
                        debug!(instance = %id, error = %e, "health check failed");
                        InstanceState::Pending
                    }
                })
            })
            .collect()
    }

    fn endpoint(&self, id: &InstanceId) -> Result<String, ComputeError> {
        if !self.hosts.contains(&id.0) {
            return Err(ComputeError(format!("unknown instance {id}")));
        }
        Ok(format!("http://{}:{}", id.0, self.port))
    }

    fn terminate(&self, ids: &[InstanceId]) -> Result<(), ComputeError> {
        self.released()?.extend(ids.iter().cloned());
        Ok(())
    }
}

pub struct FleetPool {
    compute: Arc<dyn ComputeProvider>,
    transport: Arc<dyn WorkerTransport>,
    members: Vec<InstanceId>,
    parallel: bool,
}

impl FleetPool {
    /// Launch `count` members. Readiness is checked separately.
    pub fn launch(
        compute: Arc<dyn ComputeProvider>,
        transport: Arc<dyn WorkerTransport>,
        count: usize,
        parallel: bool,
    ) -> Result<Self, DispatchError> {
        let members = compute.launch(count)?;
        info!(members = members.len(), "fleet launched");
        Ok(Self {
            compute,
            transport,
            members,
            parallel,
        })
    }

    pub fn members(&self) -> &[InstanceId] {
        &self.members
    }

    fn running(&self) -> Result<usize, DispatchError> {
        let states = self.compute.states(&self.members)?;
        Ok(states
            .iter()
            .filter(|s| **s == InstanceState::Running)
            .count())
    }
}

impl WorkerPool for FleetPool {
    fn backend(&self) -> Backend {
        Backend::Fleet
    }

    fn size(&self) -> usize {
        self.members.len()
    }

    fn is_ready(&self) -> Result<bool, DispatchError> {
        Ok(!self.members.is_empty() && self.running()? == self.members.len())
    }

    fn dispatch(&self, request: &AnalysisRequest) -> Result<DispatchOutcome, DispatchError> {
        if self.members.is_empty() {
            return Err(DispatchError::EmptyPool);
        }
        let running = self.running()?;
        if running != self.members.len() {
            return Err(DispatchError::FleetNotReady {
                running,
                total: self.members.len(),
            });
        }

        let mut targets = Vec::with_capacity(self.members.len());
        for (k, id) in self.members.iter().enumerate() {
            let url = format!("{}/analyse", self.compute.endpoint(id)?);
            let payload =
                serde_json::to_vec(&request.for_replica(k as u32)).map_err(DispatchError::Encode)?;
            targets.push((url, payload));
        }

        Ok(fan_out(targets.len(), self.parallel, |k| {
            let (url, payload) = &targets[k];
            let reply = self.transport.post_json(url, payload)?;
            if !reply.is_success() {
                return Err(WorkerError::Status {
                    status: reply.status,
                });
            }
            parse_worker_reply(&reply.body)
        }))
    }

    fn terminate(&self) -> Result<(), DispatchError> {
        self.compute.terminate(&self.members)?;
        info!(members = self.members.len(), "fleet terminated");
        Ok(())
    }

    fn is_terminated(&self) -> Result<bool, DispatchError> {
        let states = self.compute.states(&self.members)?;
        Ok(states.iter().all(|s| *s == InstanceState::Terminated))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
