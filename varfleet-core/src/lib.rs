//! varfleet core: price series, signal detection, window statistics,
//! Monte Carlo VaR and the worker request handler.
//!
//! Everything here runs inside a single worker. Fan-out, aggregation,
//! persistence and cost accounting live in `varfleet-runner`.
//!
//! Pipeline stages, leaves first:
//! - [`signal`]: flagged indices of a series (and the labeling that sets flags)
//! - [`stats`]: trailing-return mean and population std for one index
//! - [`montecarlo`]: Gaussian resampling and the VaR95/VaR99 quantiles
//! - [`outcome`]: realized forward return over the holding period
//! - [`pipeline`]: one record per flagged index, with running totals

pub mod data;
pub mod domain;
pub mod handler;
pub mod montecarlo;
pub mod outcome;
pub mod pipeline;
pub mod rng;
pub mod signal;
pub mod stats;

pub use domain::{
    AnalysisParams, AnalysisRequest, AnalysisResponse, Averages, ConfigError, PricePoint,
    SimulationRecord, TransactionType,
};
pub use handler::{handle, handle_json, HandlerError};
pub use pipeline::{run_pipeline, PipelineOutput};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything that crosses a worker thread boundary
    /// is Send + Sync. Dispatch shares requests and sources across rayon.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::PricePoint>();
        require_sync::<domain::PricePoint>();
        require_send::<domain::AnalysisRequest>();
        require_sync::<domain::AnalysisRequest>();
        require_send::<domain::AnalysisResponse>();
        require_sync::<domain::AnalysisResponse>();
        require_send::<domain::SimulationRecord>();
        require_sync::<domain::SimulationRecord>();
        require_send::<domain::RunningTotals>();
        require_sync::<domain::RunningTotals>();

        // Pipeline
        require_send::<pipeline::PipelineOutput>();
        require_sync::<pipeline::PipelineOutput>();
        require_send::<rng::SeedHierarchy>();
        require_sync::<rng::SeedHierarchy>();

        // Sources
        require_send::<data::CsvSource>();
        require_sync::<data::CsvSource>();
        require_send::<data::YahooSource>();
        require_sync::<data::YahooSource>();
        require_send::<data::InMemorySource>();
        require_sync::<data::InMemorySource>();

        // Errors travel back from workers
        require_send::<handler::HandlerError>();
        require_sync::<handler::HandlerError>();
        require_send::<data::DataError>();
        require_sync::<data::DataError>();
    }

    /// A price source can be used behind a trait object shared across threads.
    #[test]
    fn price_source_is_object_safe() {
        fn _check(source: &dyn data::PriceSource) -> &str {
            source.name()
        }
        let src = data::InMemorySource::default();
        assert_eq!(_check(&src), "in_memory");
    }
}
