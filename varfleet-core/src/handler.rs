//! Worker-side entry point.
//!
//! Every worker, whether a function invocation or a fleet member, runs the
//! same handler: parse the request, validate it, run the pipeline over the
//! whole series, answer with the partial result set and its averages.

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{AnalysisRequest, AnalysisResponse, ConfigError, InvocationEnvelope};
use crate::pipeline::run_pipeline;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl HandlerError {
    /// HTTP-style status for this failure. Both kinds are client errors.
    pub fn status_code(&self) -> u16 {
        400
    }
}

/// Run one analysis request.
pub fn handle(request: &AnalysisRequest) -> Result<AnalysisResponse, ConfigError> {
    let output = run_pipeline(&request.data, &request.params, request.replica)?;
    let averages = output.averages();
    Ok(AnalysisResponse {
        results: output.records,
        averages,
    })
}

/// Parse a JSON request and run it.
///
/// Accepts both a bare request and one wrapped as `{"body": "<json>"}` (or
/// `{"body": {...}}`) the way function gateways deliver it.
pub fn handle_json(input: &str) -> Result<AnalysisResponse, HandlerError> {
    let request = parse_request(input)?;
    info!(
        points = request.data.len(),
        minhistory = request.params.minhistory,
        shots = request.params.shots,
        transaction_type = %request.params.transaction_type,
        replica = request.replica,
        "handling analysis request"
    );
    Ok(handle(&request)?)
}

/// Like [`handle_json`], but always answers with an invocation envelope.
pub fn handle_invocation(input: &str) -> InvocationEnvelope {
    let failure = match handle_json(input) {
        Ok(response) => match InvocationEnvelope::ok(&response) {
            Ok(envelope) => return envelope,
            Err(err) => HandlerError::Malformed(err),
        },
        Err(err) => err,
    };
    warn!(error = %failure, "rejecting request");
    InvocationEnvelope::error(failure.status_code(), &failure.to_string())
}

fn parse_request(input: &str) -> Result<AnalysisRequest, serde_json::Error> {
    let mut value: Value = serde_json::from_str(input)?;
    if let Some(body) = value.get_mut("body").map(Value::take) {
        value = match body {
            Value::String(inner) => serde_json::from_str(&inner)?,
            other => other,
        };
    }
    serde_json::from_value(value)
}

// ─── Tests ───────────────────────────────────────────────────────────
