//! Parquet store for fetched datasets.
//!
//! Layout: `{data_dir}/{SYMBOL}.parquet`, one file per symbol.
//!
//! Writes are atomic (write to .tmp, rename into place), so re-running a
//! fetch replaces the previous file instead of appending to it.

use super::provider::DataError;
use crate::domain::{Dataset, PriceRecord};
use crate::schema::{SchemaType, EOD_SCHEMA};
use chrono::NaiveDate;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Deterministic output path for a symbol: `{data_dir}/{SYMBOL}.parquet`
pub fn output_path(data_dir: &Path, symbol: &str) -> PathBuf {
    data_dir.join(format!("{}.parquet", symbol.trim().to_ascii_uppercase()))
}

/// Write a dataset to `path`, replacing any existing file.
pub fn write_dataset(dataset: &Dataset, path: &Path) -> Result<(), DataError> {
    let mut df = dataset_to_frame(dataset)?;
    write_frame(&mut df, path)?;
    tracing::info!(path = %path.display(), rows = dataset.len(), "saved dataset");
    Ok(())
}

/// Write any frame to `path` atomically, creating parent directories.
pub fn write_frame(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path)?;
    if let Err(e) = ParquetWriter::new(file).finish(df) {
        let _ = fs::remove_file(&tmp_path);
        return Err(DataError::Parquet(format!("write parquet: {e}")));
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        DataError::Io(e)
    })
}

/// Read a Parquet file as-is. No schema is enforced.
pub fn read_frame(path: &Path) -> Result<DataFrame, DataError> {
    let file = fs::File::open(path)?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::Parquet(format!("read {}: {e}", path.display())))
}

/// Read a file written by [`write_dataset`] back into a dataset.
pub fn read_dataset(path: &Path) -> Result<Dataset, DataError> {
    let df = read_frame(path)?;
    frame_to_dataset(&df)
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Convert a dataset to a polars DataFrame laid out per [`EOD_SCHEMA`].
pub fn dataset_to_frame(dataset: &Dataset) -> Result<DataFrame, DataError> {
    let records = dataset.records();
    let epoch = epoch();

    let dates: Vec<i32> = records
        .iter()
        .map(|r| (r.date - epoch).num_days() as i32)
        .collect();
    let symbols: Vec<&str> = records.iter().map(|r| r.symbol.as_str()).collect();
    let opens: Vec<f64> = records.iter().map(|r| r.open).collect();
    let highs: Vec<f64> = records.iter().map(|r| r.high).collect();
    let lows: Vec<f64> = records.iter().map(|r| r.low).collect();
    let closes: Vec<f64> = records.iter().map(|r| r.close).collect();
    let volumes = records
        .iter()
        .map(|r| i64::try_from(r.volume))
        .collect::<Result<Vec<i64>, _>>()
        .map_err(|e| DataError::Parquet(format!("volume out of range: {e}")))?;
    let adj_closes: Vec<Option<f64>> = records.iter().map(|r| r.adj_close).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&SchemaType::Date.to_polars())
            .map_err(|e| DataError::Parquet(format!("date cast: {e}")))?,
        Column::new("symbol".into(), symbols),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("adj_close".into(), adj_closes),
    ])
    .map_err(|e| DataError::Parquet(format!("dataframe creation: {e}")))
}

/// Convert a frame back to a dataset, requiring the exact column types.
pub fn frame_to_dataset(df: &DataFrame) -> Result<Dataset, DataError> {
    for field in EOD_SCHEMA {
        let column = df
            .column(field.name)
            .map_err(|_| DataError::Validation(format!("missing column '{}'", field.name)))?;
        let expected = field.dtype.to_polars();
        if column.dtype() != &expected {
            return Err(DataError::Validation(format!(
                "column '{}': expected {expected}, got {}",
                field.name,
                column.dtype()
            )));
        }
    }

    let col_err = |e: PolarsError| DataError::Parquet(format!("column read: {e}"));
    let date_ca = df.column("date").map_err(col_err)?.date().map_err(col_err)?;
    let symbol_ca = df.column("symbol").map_err(col_err)?.str().map_err(col_err)?;
    let open_ca = df.column("open").map_err(col_err)?.f64().map_err(col_err)?;
    let high_ca = df.column("high").map_err(col_err)?.f64().map_err(col_err)?;
    let low_ca = df.column("low").map_err(col_err)?.f64().map_err(col_err)?;
    let close_ca = df.column("close").map_err(col_err)?.f64().map_err(col_err)?;
    let vol_ca = df.column("volume").map_err(col_err)?.i64().map_err(col_err)?;
    let adj_ca = df.column("adj_close").map_err(col_err)?.f64().map_err(col_err)?;

    let epoch = epoch();
    let null_at = |name: &str, i: usize| DataError::Validation(format!("null {name} at row {i}"));

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let days = date_ca.get(i).ok_or_else(|| null_at("date", i))?;
        let volume = vol_ca.get(i).ok_or_else(|| null_at("volume", i))?;

        records.push(PriceRecord {
            symbol: symbol_ca.get(i).ok_or_else(|| null_at("symbol", i))?.to_string(),
            date: epoch + chrono::Duration::days(i64::from(days)),
            open: open_ca.get(i).ok_or_else(|| null_at("open", i))?,
            high: high_ca.get(i).ok_or_else(|| null_at("high", i))?,
            low: low_ca.get(i).ok_or_else(|| null_at("low", i))?,
            close: close_ca.get(i).ok_or_else(|| null_at("close", i))?,
            volume: u64::try_from(volume).map_err(|_| {
                DataError::Validation(format!("negative volume {volume} at row {i}"))
            })?,
            adj_close: adj_ca.get(i),
        });
    }

    Ok(Dataset::from_sorted_unique(records)?)
}
