//! Domain types for eodlab

pub mod dataset;
pub mod record;

pub use dataset::{DateRange, Dataset, DatasetError};
pub use record::PriceRecord;
