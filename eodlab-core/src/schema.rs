//! Parquet schema contract between the fetcher and the validator.
//!
//! Defines the exact column names and data types of an EOD file. The store
//! writes this layout and the validator checks files against it.

use polars::prelude::DataType;
use serde::{Deserialize, Serialize};

/// Logical column types used in the EOD file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaType {
    Date,
    String,
    Float64,
    Int64,
}

impl SchemaType {
    /// The polars dtype this column is stored as.
    pub fn to_polars(self) -> DataType {
        match self {
            SchemaType::Date => DataType::Date,
            SchemaType::String => DataType::String,
            SchemaType::Float64 => DataType::Float64,
            SchemaType::Int64 => DataType::Int64,
        }
    }
}

/// A single field in the expected Parquet schema.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaField {
    pub name: &'static str,
    pub dtype: SchemaType,
}

/// The EOD Parquet schema, in write order.
///
/// - Columns: date, symbol, open, high, low, close, volume, adj_close
/// - Sort order: ascending by (date, symbol)
/// - Key: (symbol, date) is unique
pub const EOD_SCHEMA: &[SchemaField] = &[
    SchemaField {
        name: "date",
        dtype: SchemaType::Date,
    },
    SchemaField {
        name: "symbol",
        dtype: SchemaType::String,
    },
    SchemaField {
        name: "open",
        dtype: SchemaType::Float64,
    },
    SchemaField {
        name: "high",
        dtype: SchemaType::Float64,
    },
    SchemaField {
        name: "low",
        dtype: SchemaType::Float64,
    },
    SchemaField {
        name: "close",
        dtype: SchemaType::Float64,
    },
    SchemaField {
        name: "volume",
        dtype: SchemaType::Int64,
    },
    SchemaField {
        name: "adj_close",
        dtype: SchemaType::Float64,
    },
];

/// Column names of the contract, in write order.
pub fn column_names() -> Vec<&'static str> {
    EOD_SCHEMA.iter().map(|f| f.name).collect()
}
