//! Market data: price sources feeding the analysis.

pub mod csv;
pub mod provider;
pub mod yahoo;

pub use self::csv::{parse_csv, CsvSource};
pub use provider::{DataError, InMemorySource, PriceSource};
pub use yahoo::YahooSource;
