//! Data provider trait and structured error types.
//!
//! The EodProvider trait abstracts over the price source so the fetch stage
//! can be exercised against canned responses in tests.

use crate::domain::{DateRange, Dataset, DatasetError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured error types for data operations.
///
/// These are designed to be displayable in CLI context.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Where the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    MarketStack,
    Fixture,
}

/// Result of a successful fetch for a single symbol.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub symbol: String,
    pub dataset: Dataset,
    pub source: DataSource,
    pub page: Option<PageInfo>,
}

impl FetchResult {
    /// True when the provider holds rows past the page that was returned.
    pub fn is_truncated(&self) -> bool {
        self.page.is_some_and(|p| p.is_truncated())
    }
}

/// Paging metadata reported alongside a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub limit: u64,
    pub offset: u64,
    pub count: u64,
    pub total: u64,
}

impl PageInfo {
    pub fn is_truncated(&self) -> bool {
        self.offset.saturating_add(self.count) < self.total
    }
}

/// A source of end-of-day prices.
///
/// Implementations issue a single request and either return a whole dataset
/// or fail; there is no retry or partial result.
pub trait EodProvider {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily records for one symbol over an inclusive date range.
    fn fetch_eod(&self, symbol: &str, range: DateRange) -> Result<FetchResult, DataError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(offset: u64, count: u64, total: u64) -> PageInfo {
        PageInfo {
            limit: 1000,
            offset,
            count,
            total,
        }
    }

    #[test]
    fn truncation_compares_end_of_page_with_total() {
        assert!(page(0, 1000, 1500).is_truncated());
        assert!(!page(500, 1000, 1500).is_truncated());
        assert!(!page(0, 6, 6).is_truncated());
    }

    #[test]
    fn extreme_pagination_does_not_overflow() {
        assert!(!page(u64::MAX, 10, u64::MAX).is_truncated());
        assert!(!page(u64::MAX, u64::MAX, 5).is_truncated());
    }
}
