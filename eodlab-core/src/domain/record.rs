//! PriceRecord: one trading day for one symbol.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// End-of-day OHLCV record for a single symbol on a single trading day.
///
/// `adj_close` is MarketStack's split/dividend adjusted close. It is kept for
/// reference and may be missing for recent sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub adj_close: Option<f64>,
}

impl PriceRecord {
    /// Key that identifies this record within a dataset.
    pub fn key(&self) -> (NaiveDate, &str) {
        (self.date, self.symbol.as_str())
    }

    /// Broken price invariants, as readable messages. Empty when consistent.
    pub fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();

        for (name, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if !(value > 0.0) {
                out.push(format!("{name} must be positive, got {value}"));
            }
        }

        if self.high < self.low {
            out.push(format!("high {} below low {}", self.high, self.low));
        }
        if self.high < self.open || self.high < self.close {
            out.push(format!(
                "high {} below open/close ({}/{})",
                self.high, self.open, self.close
            ));
        }
        if self.low > self.open || self.low > self.close {
            out.push(format!(
                "low {} above open/close ({}/{})",
                self.low, self.open, self.close
            ));
        }

        out
    }

    /// True when every price invariant holds.
    pub fn is_sane(&self) -> bool {
        self.violations().is_empty()
    }
}
