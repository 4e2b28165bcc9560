//! PricePoint: one trading day of the input series, plus its signal flags.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transaction condition a signal flag represents.
///
/// Serialized capitalized (`"Buy"`, `"Sell"`) as the record `type` field is;
/// the lowercase spelling used in request payloads is accepted too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransactionType {
    #[serde(alias = "buy", alias = "BUY")]
    Buy,
    #[serde(alias = "sell", alias = "SELL")]
    Sell,
}

impl TransactionType {
    pub const ALL: [TransactionType; 2] = [TransactionType::Buy, TransactionType::Sell];

    /// Lowercase name, used in storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Buy => "buy",
            TransactionType::Sell => "sell",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown transaction type '{0}' (expected buy or sell)")]
pub struct UnknownTransactionType(pub String);

impl FromStr for TransactionType {
    type Err = UnknownTransactionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(TransactionType::Buy),
            "sell" => Ok(TransactionType::Sell),
            _ => Err(UnknownTransactionType(s.to_string())),
        }
    }
}

/// Daily price point with one precomputed flag per transaction type.
///
/// Field names follow the market-data payload (`Date`, `Open`, `Close`, `Buy`,
/// `Sell`). Flags travel as `0`/`1`; booleans are accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    /// Missing in payloads that only carry closes; signal labeling needs it.
    #[serde(rename = "Open", default, skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(rename = "Close")]
    pub close: f64,
    #[serde(rename = "Buy", with = "flag", default)]
    pub buy: bool,
    #[serde(rename = "Sell", with = "flag", default)]
    pub sell: bool,
}

impl PricePoint {
    pub fn new(date: NaiveDate, open: Option<f64>, close: f64) -> Self {
        Self {
            date,
            open,
            close,
            buy: false,
            sell: false,
        }
    }

    /// The precomputed flag for `tx`.
    pub fn flag(&self, tx: TransactionType) -> bool {
        match tx {
            TransactionType::Buy => self.buy,
            TransactionType::Sell => self.sell,
        }
    }

    pub fn set_flag(&mut self, tx: TransactionType, value: bool) {
        match tx {
            TransactionType::Buy => self.buy = value,
            TransactionType::Sell => self.sell = value,
        }
    }
}

/// Closing prices of a series, in order.
pub fn closes(series: &[PricePoint]) -> Vec<f64> {
    series.iter().map(|p| p.close).collect()
}

/// Serde adapter: flags are written as `0`/`1` and read from ints, floats or bools.
mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawFlag {
        Bool(bool),
        Int(i64),
        Float(f64),
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match RawFlag::deserialize(deserializer)? {
            RawFlag::Bool(b) => b,
            RawFlag::Int(i) => i != 0,
            RawFlag::Float(f) => f != 0.0,
        })
    }
}
