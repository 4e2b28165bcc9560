//! Analysis request/response: the payload exchanged with every worker.
//!
//! The request field names (`data`, `minhistory`, `shots`, `t`, `p`) match the
//! payload workers already understand, so serverless functions and fleet
//! members can be swapped without a schema change.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::price::{PricePoint, TransactionType};
use super::record::{Averages, SimulationRecord};

/// Shortest trailing window that still yields a standard deviation.
pub const MIN_HISTORY_FLOOR: usize = 2;

/// Fewer draws than this leave the 1% quantile without a sample to index.
pub const MIN_SHOTS: usize = 100;

pub const DEFAULT_MINHISTORY: usize = 101;
pub const DEFAULT_SHOTS: usize = 10_000;
pub const DEFAULT_CHECK_DAYS: usize = 7;

/// Invalid or missing run parameters. Always raised before any dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("minhistory must be at least {MIN_HISTORY_FLOOR}, got {0}")]
    MinHistoryTooShort(usize),

    #[error("shots must be at least {MIN_SHOTS}, got {0}")]
    TooFewShots(usize),

    #[error("holding period (check_days) must be at least 1")]
    ZeroHoldingPeriod,

    #[error("replication factor must be at least 1")]
    ZeroReplication,
}

/// Run parameters shared by every worker of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    /// Trailing window length (number of returns) per signal.
    #[serde(default = "default_minhistory")]
    pub minhistory: usize,

    /// Monte Carlo draws per signal.
    #[serde(default = "default_shots")]
    pub shots: usize,

    #[serde(rename = "t", default = "default_transaction_type")]
    pub transaction_type: TransactionType,

    /// Holding period for the realized outcome, in trading days.
    #[serde(rename = "p", default = "default_check_days")]
    pub check_days: usize,

    /// Master seed. `None` draws one from OS entropy, so the run is not reproducible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_minhistory() -> usize {
    DEFAULT_MINHISTORY
}

fn default_shots() -> usize {
    DEFAULT_SHOTS
}

fn default_transaction_type() -> TransactionType {
    TransactionType::Buy
}

fn default_check_days() -> usize {
    DEFAULT_CHECK_DAYS
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            minhistory: DEFAULT_MINHISTORY,
            shots: DEFAULT_SHOTS,
            transaction_type: TransactionType::Buy,
            check_days: DEFAULT_CHECK_DAYS,
            seed: None,
        }
    }
}

impl AnalysisParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.minhistory < MIN_HISTORY_FLOOR {
            return Err(ConfigError::MinHistoryTooShort(self.minhistory));
        }
        if self.shots < MIN_SHOTS {
            return Err(ConfigError::TooFewShots(self.shots));
        }
        if self.check_days == 0 {
            return Err(ConfigError::ZeroHoldingPeriod);
        }
        Ok(())
    }
}

/// Request sent to one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(default)]
    pub data: Vec<PricePoint>,

    #[serde(flatten)]
    pub params: AnalysisParams,

    /// Which replica of the batch this is; folded into per-signal seeds so
    /// replicas of a seeded run draw independent samples.
    #[serde(default)]
    pub replica: u32,
}

impl AnalysisRequest {
    pub fn new(data: Vec<PricePoint>, params: AnalysisParams) -> Self {
        Self {
            data,
            params,
            replica: 0,
        }
    }

    /// A copy addressed to replica `replica`.
    pub fn for_replica(&self, replica: u32) -> Self {
        Self {
            replica,
            ..self.clone()
        }
    }
}

/// What a worker returns: its partial result set and the averages over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub results: Vec<SimulationRecord>,
    pub averages: Averages,
}

/// `{"statusCode": .., "body": "<json>"}` wrapper used by function invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationEnvelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl InvocationEnvelope {
    pub fn ok(response: &AnalysisResponse) -> Result<Self, serde_json::Error> {
        Ok(Self {
            status_code: 200,
            body: serde_json::to_string(response)?,
        })
    }

    pub fn error(status_code: u16, message: &str) -> Self {
        Self {
            status_code,
            body: serde_json::json!({ "message": message }).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_parameters() {
        let req: AnalysisRequest = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert_eq!(req.params.minhistory, 101);
        assert_eq!(req.params.shots, 10_000);
        assert_eq!(req.params.transaction_type, TransactionType::Buy);
        assert_eq!(req.params.check_days, 7);
        assert_eq!(req.params.seed, None);
        assert_eq!(req.replica, 0);
    }

    #[test]
    fn short_field_names_on_the_wire() {
        let json = r#"{"data": [], "minhistory": 5, "shots": 500, "t": "sell", "p": 3, "seed": 9}"#;
        let req: AnalysisRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.params.transaction_type, TransactionType::Sell);
        assert_eq!(req.params.check_days, 3);
        assert_eq!(req.params.seed, Some(9));

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["t"], "Sell");
        assert_eq!(value["p"], 3);
        assert_eq!(value["minhistory"], 5);
    }

    #[test]
    fn validation_rejects_bad_parameters() {
        let mut params = AnalysisParams::default();
        assert!(params.validate().is_ok());

        params.shots = 99;
        assert_eq!(params.validate(), Err(ConfigError::TooFewShots(99)));

        params.shots = 100;
        params.minhistory = 1;
        assert_eq!(params.validate(), Err(ConfigError::MinHistoryTooShort(1)));

        params.minhistory = 2;
        params.check_days = 0;
        assert_eq!(params.validate(), Err(ConfigError::ZeroHoldingPeriod));
    }

    #[test]
    fn for_replica_keeps_payload() {
        let req = AnalysisRequest::new(Vec::new(), AnalysisParams::default());
        let third = req.for_replica(2);
        assert_eq!(third.replica, 2);
        assert_eq!(third.params, req.params);
    }

    #[test]
    fn envelope_carries_body_as_string() {
        let resp = AnalysisResponse {
            results: Vec::new(),
            averages: Averages::default(),
        };
        let env = InvocationEnvelope::ok(&resp).unwrap();
        assert_eq!(env.status_code, 200);
        let inner: AnalysisResponse = serde_json::from_str(&env.body).unwrap();
        assert_eq!(inner, resp);
    }
}
