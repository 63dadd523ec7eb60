//! Dataset: the records produced by one fetch run, unique by (symbol, date).

use super::record::PriceRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DatasetError {
    #[error("invalid date range: start {start} is after end {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error("duplicate record for {symbol} on {date}")]
    DuplicateKey { symbol: String, date: NaiveDate },
}

/// Inclusive calendar range `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DatasetError> {
        if start > end {
            return Err(DatasetError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Ordered price records for one fetch request.
///
/// Records are sorted ascending by `(date, symbol)` and no two share the same
/// `(symbol, date)` key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    records: Vec<PriceRecord>,
}

impl Dataset {
    /// Sort and dedupe. The first record seen for a key wins.
    pub fn new(mut records: Vec<PriceRecord>) -> Self {
        // stable sort keeps arrival order among equal keys
        records.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.symbol.cmp(&b.symbol)));
        records.dedup_by(|later, earlier| later.key() == earlier.key());
        Self { records }
    }

    /// Build from records that must already be unique. Order is normalized.
    pub fn from_sorted_unique(records: Vec<PriceRecord>) -> Result<Self, DatasetError> {
        let mut seen = BTreeSet::new();
        for rec in &records {
            if !seen.insert((rec.date, rec.symbol.clone())) {
                return Err(DatasetError::DuplicateKey {
                    symbol: rec.symbol.clone(),
                    date: rec.date,
                });
            }
        }
        Ok(Self::new(records))
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First and last trading day covered.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.records.first()?.date, self.records.last()?.date))
    }
}
