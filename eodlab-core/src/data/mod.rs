//! Data acquisition, storage and validation

pub mod fetch;
pub mod marketstack;
pub mod provider;
pub mod store;
pub mod validation;

pub use fetch::{fetch_to_parquet, FetchSummary};
pub use marketstack::MarketStackProvider;
pub use provider::{DataError, DataSource, EodProvider, FetchResult, PageInfo};
pub use validation::{
    validate_file, validate_frame, Expectation, ExpectationResult, ExpectationSuite,
    ValidationReport,
};
