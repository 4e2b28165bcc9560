//! CSV price import.
//!
//! Reads the usual daily export layout (`Date,Open,High,Low,Close,...`).
//! Only `Date` and `Close` are required; `Open` enables signal labeling and
//! optional `Buy`/`Sell` columns are ignored, since flags are always relabeled.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use super::provider::{within, DataError, PriceSource};
use crate::domain::PricePoint;

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Open", default)]
    open: Option<f64>,
    #[serde(rename = "Close")]
    close: f64,
}

/// One CSV file holding a single symbol's history.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the whole file, ascending by date.
    pub fn read_all(&self) -> Result<Vec<PricePoint>, DataError> {
        let display = self.path.display().to_string();
        let file = std::fs::File::open(&self.path).map_err(|source| DataError::Io {
            path: display.clone(),
            source,
        })?;
        parse_csv(file, &display)
    }
}

/// Parse CSV price rows from any reader. `origin` names the input in errors.
pub fn parse_csv<R: std::io::Read>(reader: R, origin: &str) -> Result<Vec<PricePoint>, DataError> {
    let mut rdr = ::csv::ReaderBuilder::new().trim(::csv::Trim::All).from_reader(reader);
    let mut points = Vec::new();
    for row in rdr.deserialize::<CsvRow>() {
        let row = row.map_err(|source| DataError::Csv {
            path: origin.to_string(),
            source,
        })?;
        points.push(PricePoint::new(row.date, row.open, row.close));
    }
    points.sort_by_key(|p| p.date);
    debug!(origin, rows = points.len(), "parsed price CSV");
    Ok(points)
}

impl PriceSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, DataError> {
        let points = within(&self.read_all()?, start, end);
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
