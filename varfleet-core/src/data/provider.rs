//! Price source trait and structured error types.
//!
//! A `PriceSource` abstracts over where the daily series comes from (Yahoo's
//! chart API, a CSV export, an in-memory fixture) so the orchestrator can be
//! driven against any of them and mocked in tests.

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::PricePoint;

/// Structured error types for price fetching.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("no prices for '{symbol}' between {start} and {end}")]
    EmptyRange {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}")]
    Csv {
        path: String,
        #[source]
        source: ::csv::Error,
    },

    #[error("data error: {0}")]
    Other(String),
}

/// Source of daily price series.
///
/// Implementations return points in ascending date order with flags cleared;
/// signal labeling is applied afterwards by the caller.
pub trait PriceSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch daily prices for a symbol over `start..=end`.
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, DataError>;
}

/// Fixed series served for any symbol, filtered by date. Used in tests and
/// for replaying a captured series.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    points: Vec<PricePoint>,
}

impl InMemorySource {
    pub fn new(mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.date);
        Self { points }
    }
}

impl PriceSource for InMemorySource {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, DataError> {
        let points = within(&self.points, start, end);
        if points.is_empty() {
            return Err(DataError::EmptyRange {
                symbol: symbol.to_string(),
                start,
                end,
            });
        }
        Ok(points)
    }
}

/// Points dated within `start..=end`, flags cleared.
pub(crate) fn within(points: &[PricePoint], start: NaiveDate, end: NaiveDate) -> Vec<PricePoint> {
    points
        .iter()
        .filter(|p| p.date >= start && p.date <= end)
        .map(|p| PricePoint::new(p.date, p.open, p.close))
        .collect()
}
