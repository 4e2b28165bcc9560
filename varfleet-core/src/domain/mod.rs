//! Domain types for varfleet: price points, signal records and the worker wire format.

pub mod price;
pub mod record;
pub mod request;

pub use price::{closes, PricePoint, TransactionType, UnknownTransactionType};
pub use record::{Averages, RunningTotals, SimulationRecord};
pub use request::{
    AnalysisParams, AnalysisRequest, AnalysisResponse, ConfigError, InvocationEnvelope,
    DEFAULT_CHECK_DAYS, DEFAULT_MINHISTORY, DEFAULT_SHOTS, MIN_HISTORY_FLOOR, MIN_SHOTS,
};
