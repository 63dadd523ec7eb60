//! Post-write validation of EOD Parquet files.
//!
//! A fixed expectation suite is evaluated against the frame read back from
//! disk: column set, nulls, column types, price relationships, value ranges,
//! key uniqueness, row count and the symbol universe. Every rule produces a
//! pass/fail entry; a rule that cannot be evaluated (missing column, wrong
//! type) fails with an explanation instead of aborting the run.
//!
//! Reading the file is the only hard failure.

use super::provider::DataError;
use super::store;
use crate::schema::{column_names, SchemaType, EOD_SCHEMA};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

pub const STOCK_SUITE_NAME: &str = "stock_data_expectation_suite";

/// One rule of an expectation suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expectation {
    /// The frame has exactly these columns, in any order.
    ColumnsMatchSet { columns: Vec<String> },
    NotNull { column: String },
    ColumnType { column: String, dtype: SchemaType },
    /// `column_a >= column_b` on every row.
    PairGreaterOrEqual { column_a: String, column_b: String },
    /// `low <= column <= high` on every row.
    WithinBand { column: String, low: String, high: String },
    Positive { column: String },
    NonNegative { column: String },
    CompoundUnique { columns: Vec<String> },
    RowCountAtLeast { min: usize },
    ValuesInSet { column: String, values: Vec<String> },
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::ColumnsMatchSet { .. } => write!(f, "expect_table_columns_to_match_set"),
            Expectation::NotNull { column } => {
                write!(f, "expect_column_values_to_not_be_null({column})")
            }
            Expectation::ColumnType { column, dtype } => {
                write!(f, "expect_column_values_to_be_of_type({column}, {dtype:?})")
            }
            Expectation::PairGreaterOrEqual { column_a, column_b } => write!(
                f,
                "expect_column_pair_values_a_to_be_greater_than_or_equal_to_b({column_a}, {column_b})"
            ),
            Expectation::WithinBand { column, low, high } => {
                write!(f, "expect_column_values_to_be_within_band({low} <= {column} <= {high})")
            }
            Expectation::Positive { column } => {
                write!(f, "expect_column_values_to_be_between({column}, > 0)")
            }
            Expectation::NonNegative { column } => {
                write!(f, "expect_column_values_to_be_between({column}, >= 0)")
            }
            Expectation::CompoundUnique { columns } => {
                write!(f, "expect_compound_columns_to_be_unique({})", columns.join(", "))
            }
            Expectation::RowCountAtLeast { min } => {
                write!(f, "expect_table_row_count_to_be_between(min={min})")
            }
            Expectation::ValuesInSet { column, .. } => {
                write!(f, "expect_column_values_to_be_in_set({column})")
            }
        }
    }
}

/// Outcome of one expectation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationResult {
    pub expectation: String,
    pub success: bool,
    /// Offending rows, for row-level rules that could be evaluated.
    pub unexpected_count: Option<usize>,
    pub observed: String,
}

impl ExpectationResult {
    fn pass(
        exp: &Expectation,
        unexpected_count: Option<usize>,
        observed: impl Into<String>,
    ) -> Self {
        Self {
            expectation: exp.to_string(),
            success: true,
            unexpected_count,
            observed: observed.into(),
        }
    }

    fn fail(
        exp: &Expectation,
        unexpected_count: Option<usize>,
        observed: impl Into<String>,
    ) -> Self {
        Self {
            expectation: exp.to_string(),
            success: false,
            unexpected_count,
            observed: observed.into(),
        }
    }

    fn from_count(exp: &Expectation, count: usize) -> Self {
        if count == 0 {
            Self::pass(exp, Some(0), "0 unexpected rows")
        } else {
            Self::fail(exp, Some(count), format!("{count} unexpected rows"))
        }
    }
}

/// Structured result of checking a frame against a suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub suite: String,
    pub source: Option<String>,
    pub row_count: usize,
    pub success: bool,
    pub results: Vec<ExpectationResult>,
}

impl ValidationReport {
    pub fn evaluated_count(&self) -> usize {
        self.results.len()
    }

    pub fn successful_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExpectationResult> {
        self.results.iter().filter(|r| !r.success)
    }

    /// Result for the first expectation whose label starts with `prefix`.
    pub fn find(&self, prefix: &str) -> Option<&ExpectationResult> {
        self.results.iter().find(|r| r.expectation.starts_with(prefix))
    }
}

/// A named, ordered list of expectations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationSuite {
    pub name: String,
    pub expectations: Vec<Expectation>,
}

impl ExpectationSuite {
    /// The fixed battery for EOD stock files.
    pub fn stock_eod(allowed_symbols: &[String]) -> Self {
        let s = |v: &str| v.to_string();
        let mut expectations = vec![Expectation::ColumnsMatchSet {
            columns: column_names().into_iter().map(s).collect(),
        }];

        for column in ["date", "symbol", "open", "close", "volume"] {
            expectations.push(Expectation::NotNull { column: s(column) });
        }

        for field in EOD_SCHEMA {
            expectations.push(Expectation::ColumnType {
                column: s(field.name),
                dtype: field.dtype,
            });
        }

        expectations.push(Expectation::PairGreaterOrEqual {
            column_a: s("high"),
            column_b: s("low"),
        });
        for column in ["open", "close"] {
            expectations.push(Expectation::WithinBand {
                column: s(column),
                low: s("low"),
                high: s("high"),
            });
        }

        for column in ["open", "high", "low", "close"] {
            expectations.push(Expectation::Positive { column: s(column) });
        }
        expectations.push(Expectation::NonNegative { column: s("volume") });

        expectations.push(Expectation::CompoundUnique {
            columns: vec![s("date"), s("symbol")],
        });
        expectations.push(Expectation::RowCountAtLeast { min: 1 });
        expectations.push(Expectation::ValuesInSet {
            column: s("symbol"),
            values: allowed_symbols.to_vec(),
        });

        Self {
            name: STOCK_SUITE_NAME.to_string(),
            expectations,
        }
    }

    pub fn len(&self) -> usize {
        self.expectations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expectations.is_empty()
    }
}

/// Load `path` and evaluate `suite` against it.
///
/// Fails only when the file cannot be read or parsed.
pub fn validate_file(path: &Path, suite: &ExpectationSuite) -> Result<ValidationReport, DataError> {
    let df = store::read_frame(path)?;
    let mut report = validate_frame(&df, suite);
    report.source = Some(path.display().to_string());
    Ok(report)
}

/// Evaluate `suite` against an in-memory frame.
pub fn validate_frame(df: &DataFrame, suite: &ExpectationSuite) -> ValidationReport {
    let results: Vec<ExpectationResult> = suite
        .expectations
        .iter()
        .map(|exp| evaluate(df, exp))
        .collect();

    for failed in results.iter().filter(|r| !r.success) {
        tracing::warn!(
            expectation = %failed.expectation,
            observed = %failed.observed,
            "expectation failed"
        );
    }

    let report = ValidationReport {
        suite: suite.name.clone(),
        source: None,
        row_count: df.height(),
        success: results.iter().all(|r| r.success),
        results,
    };
    tracing::info!(
        "Successful expectations: {} / {}",
        report.successful_count(),
        report.evaluated_count()
    );
    report
}

fn evaluate(df: &DataFrame, exp: &Expectation) -> ExpectationResult {
    match exp {
        Expectation::ColumnsMatchSet { columns } => check_column_set(df, exp, columns),
        Expectation::NotNull { column } => match df.column(column) {
            Ok(c) => ExpectationResult::from_count(exp, c.null_count()),
            Err(_) => missing(exp, column),
        },
        Expectation::ColumnType { column, dtype } => match df.column(column) {
            Ok(c) => {
                let expected = dtype.to_polars();
                if c.dtype() == &expected {
                    ExpectationResult::pass(exp, None, format!("{expected}"))
                } else {
                    let observed = format!("expected {expected}, got {}", c.dtype());
                    ExpectationResult::fail(exp, None, observed)
                }
            }
            Err(_) => missing(exp, column),
        },
        Expectation::PairGreaterOrEqual { column_a, column_b } => {
            let violation = col(column_a.as_str()).lt(col(column_b.as_str()));
            row_check(df, exp, &[column_a, column_b], violation)
        }
        Expectation::WithinBand { column, low, high } => row_check(
            df,
            exp,
            &[column, low, high],
            col(column.as_str())
                .lt(col(low.as_str()))
                .or(col(column.as_str()).gt(col(high.as_str()))),
        ),
        Expectation::Positive { column } => {
            row_check(df, exp, &[column], col(column.as_str()).lt_eq(lit(0.0)))
        }
        Expectation::NonNegative { column } => {
            row_check(df, exp, &[column], col(column.as_str()).lt(lit(0)))
        }
        Expectation::CompoundUnique { columns } => check_unique(df, exp, columns),
        Expectation::RowCountAtLeast { min } => {
            let n = df.height();
            if n >= *min {
                ExpectationResult::pass(exp, None, format!("{n} rows"))
            } else {
                ExpectationResult::fail(exp, None, format!("{n} rows, expected at least {min}"))
            }
        }
        Expectation::ValuesInSet { column, values } => check_in_set(df, exp, column, values),
    }
}

fn missing(exp: &Expectation, column: &str) -> ExpectationResult {
    ExpectationResult::fail(exp, None, format!("column '{column}' not found"))
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::UInt64
            | DataType::UInt32
    )
}

fn is_float(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Float64 | DataType::Float32)
}

fn check_column_set(df: &DataFrame, exp: &Expectation, columns: &[String]) -> ExpectationResult {
    let actual: BTreeSet<String> = df.get_column_names().iter().map(|n| n.to_string()).collect();
    let expected: BTreeSet<String> = columns.iter().cloned().collect();

    let missing: Vec<&String> = expected.difference(&actual).collect();
    let unexpected: Vec<&String> = actual.difference(&expected).collect();

    if missing.is_empty() && unexpected.is_empty() {
        ExpectationResult::pass(exp, None, "columns match")
    } else {
        let observed = format!("missing {missing:?}, unexpected {unexpected:?}");
        ExpectationResult::fail(exp, None, observed)
    }
}

/// Count rows matching `violation`, after checking the inputs are numeric.
///
/// A row whose operand is null or NaN counts as unexpected too.
fn row_check(
    df: &DataFrame,
    exp: &Expectation,
    columns: &[&String],
    violation: Expr,
) -> ExpectationResult {
    let mut predicate = violation;
    for name in columns {
        let c = match df.column(name.as_str()) {
            Ok(c) => c,
            Err(_) => return missing(exp, name),
        };
        if !is_numeric(c.dtype()) {
            return ExpectationResult::fail(
                exp,
                None,
                format!("column '{name}' has non-numeric type {}", c.dtype()),
            );
        }

        let operand = col(name.as_str());
        predicate = predicate.or(operand.clone().is_null());
        if is_float(c.dtype()) {
            predicate = predicate.or(operand.is_nan());
        }
    }

    match df.clone().lazy().filter(predicate).collect() {
        Ok(bad) => ExpectationResult::from_count(exp, bad.height()),
        Err(e) => ExpectationResult::fail(exp, None, format!("evaluation error: {e}")),
    }
}

fn check_unique(df: &DataFrame, exp: &Expectation, columns: &[String]) -> ExpectationResult {
    if let Some(absent) = columns.iter().find(|c| df.column(c.as_str()).is_err()) {
        return missing(exp, absent);
    }

    let keys: Vec<Expr> = columns.iter().map(|c| col(c.as_str())).collect();
    let distinct = df
        .clone()
        .lazy()
        .select(keys)
        .unique(None, UniqueKeepStrategy::First)
        .collect();

    match distinct {
        Ok(distinct) => ExpectationResult::from_count(exp, df.height() - distinct.height()),
        Err(e) => ExpectationResult::fail(exp, None, format!("evaluation error: {e}")),
    }
}

fn check_in_set(
    df: &DataFrame,
    exp: &Expectation,
    column: &str,
    values: &[String],
) -> ExpectationResult {
    let c = match df.column(column) {
        Ok(c) => c,
        Err(_) => return missing(exp, column),
    };
    let ca = match c.str() {
        Ok(ca) => ca,
        Err(_) => {
            let observed = format!("column '{column}' has non-string type {}", c.dtype());
            return ExpectationResult::fail(exp, None, observed);
        }
    };

    let allowed: BTreeSet<&str> = values.iter().map(String::as_str).collect();
    let outside: Vec<&str> = ca.into_iter().flatten().filter(|v| !allowed.contains(v)).collect();

    if outside.is_empty() {
        ExpectationResult::pass(exp, Some(0), "all values allowed")
    } else {
        let distinct: BTreeSet<&str> = outside.iter().copied().collect();
        let observed = format!("values outside set: {distinct:?}");
        ExpectationResult::fail(exp, Some(outside.len()), observed)
    }
}
