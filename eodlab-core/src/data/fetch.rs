//! Fetch stage: provider → dataset → Parquet file.

use super::provider::{DataError, DataSource, EodProvider, FetchResult};
use super::store;
use crate::domain::DateRange;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// What one fetch run produced.
#[derive(Debug)]
pub struct FetchSummary {
    pub symbol: String,
    pub source: DataSource,
    pub path: PathBuf,
    pub records: usize,
    /// First and last trading day written, `None` for an empty dataset.
    pub dates: Option<(NaiveDate, NaiveDate)>,
    pub truncated: bool,
}

/// Fetch one symbol and write it to `{data_dir}/{SYMBOL}.parquet`.
///
/// Any error aborts the run before the file is touched.
pub fn fetch_to_parquet(
    provider: &dyn EodProvider,
    symbol: &str,
    range: DateRange,
    data_dir: &Path,
) -> Result<FetchSummary, DataError> {
    let FetchResult {
        symbol,
        dataset,
        source,
        page,
    } = provider.fetch_eod(symbol, range)?;

    tracing::info!(
        provider = provider.name(),
        source = ?source,
        symbol = %symbol,
        records = dataset.len(),
        "fetched dataset"
    );

    let path = store::output_path(data_dir, &symbol);
    store::write_dataset(&dataset, &path)?;

    Ok(FetchSummary {
        records: dataset.len(),
        dates: dataset.date_range(),
        truncated: page.is_some_and(|p| p.is_truncated()),
        symbol,
        source,
        path,
    })
}
