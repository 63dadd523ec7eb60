//! eodlab core: end-of-day price ingestion for a single symbol.
//!
//! Two file-mediated stages:
//! - Fetch: one MarketStack `/eod` request → sorted, de-duplicated dataset → Parquet
//! - Validate: read the Parquet file back and run a fixed expectation suite
//!
//! Settings come from `config.toml` and the `MARKETSTACK_API_KEY` variable.

pub mod config;
pub mod data;
pub mod domain;
pub mod schema;

pub use config::{ConfigError, Settings};
pub use data::{DataError, EodProvider, ExpectationSuite, MarketStackProvider, ValidationReport};
pub use domain::{DateRange, Dataset, PriceRecord};
