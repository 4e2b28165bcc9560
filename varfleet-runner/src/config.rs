//! Service configuration, loaded from TOML.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration:
//!
//! ```toml
//! [store]
//! root = "varfleet-data"
//! write_guard = "conditional"
//!
//! [dispatch]
//! parallel = true
//! timeout_secs = 60
//!
//! [serverless]
//! function_name = "varfleet-analyse"
//! # url = "https://example.invalid/analyse"
//!
//! [fleet]
//! hosts = ["10.0.0.5", "10.0.0.6"]
//! port = 5000
//!
//! [pricing]
//! hourly_rate = 0.0134
//! memory_gb = 1.0
//! unit_price = 0.0000166667
//!
//! [market]
//! symbol = "NVDA"
//! lookback_days = 1095
//! # csv_path = "prices.csv"
//! body_threshold = 0.01
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use varfleet_core::signal::DEFAULT_BODY_THRESHOLD;

use crate::cost::Pricing;
use crate::store::WriteGuard;

#[derive(Debug, Error)]
pub enum ServiceConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub store: StoreConfig,
    pub dispatch: DispatchConfig,
    pub serverless: ServerlessConfig,
    pub fleet: FleetConfig,
    pub pricing: Pricing,
    pub market: MarketConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory of the file-backed store.
    pub root: PathBuf,
    pub write_guard: WriteGuard,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("varfleet-data"),
            write_guard: WriteGuard::Conditional,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Fan out on the rayon pool instead of one worker at a time.
    pub parallel: bool,
    /// Per-request HTTP timeout; `None` keeps the transport default.
    pub timeout_secs: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            timeout_secs: None,
        }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerlessConfig {
    pub function_name: String,
    /// Function URL. Unset means invoke the handler in-process.
    pub url: Option<String>,
}

impl Default for ServerlessConfig {
    fn default() -> Self {
        Self {
            function_name: "varfleet-analyse".to_string(),
            url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub hosts: Vec<String>,
    pub port: u16,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub symbol: String,
    /// Days of history fetched for each run, ending today.
    pub lookback_days: u64,
    /// Read prices from this CSV instead of the chart API.
    pub csv_path: Option<PathBuf>,
    pub body_threshold: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbol: "NVDA".to_string(),
            lookback_days: 3 * 365,
            csv_path: None,
            body_threshold: DEFAULT_BODY_THRESHOLD,
        }
    }
}

impl ServiceConfig {
    pub fn from_toml(text: &str) -> Result<Self, ServiceConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ServiceConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ServiceConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<(), ServiceConfigError> {
        let p = &self.pricing;
        for (name, value) in [
            ("pricing.hourly_rate", p.hourly_rate),
            ("pricing.memory_gb", p.memory_gb),
            ("pricing.unit_price", p.unit_price),
            ("market.body_threshold", self.market.body_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ServiceConfigError::Invalid(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if self.market.lookback_days == 0 {
            return Err(ServiceConfigError::Invalid(
                "market.lookback_days must be at least 1".into(),
            ));
        }
        if self.serverless.function_name.trim().is_empty() {
            return Err(ServiceConfigError::Invalid(
                "serverless.function_name is empty".into(),
            ));
        }
        if self.fleet.hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(ServiceConfigError::Invalid("fleet.hosts has an empty entry".into()));
        }
        Ok(())
    }
}
