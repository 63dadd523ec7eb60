//! Integration tests for the fetch → write → validate pipeline using a
//! frozen MarketStack response.

use chrono::{Datelike, NaiveDate, Weekday};
use eodlab_core::data::marketstack::parse_eod_body;
use eodlab_core::data::provider::{DataError, DataSource, EodProvider, FetchResult};
use eodlab_core::data::{fetch_to_parquet, store, validate_file, ExpectationSuite};
use eodlab_core::domain::DateRange;
use std::collections::HashSet;
use std::path::PathBuf;

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name);
    std::fs::read_to_string(path).unwrap()
}

fn jan(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
}

/// Serves a canned `/eod` body instead of calling the network.
struct FixtureProvider {
    body: String,
}

impl EodProvider for FixtureProvider {
    fn name(&self) -> &str {
        "fixture"
    }

    fn fetch_eod(&self, symbol: &str, range: DateRange) -> Result<FetchResult, DataError> {
        let (dataset, page) = parse_eod_body(symbol, range, &self.body)?;
        Ok(FetchResult {
            symbol: symbol.to_string(),
            dataset,
            source: DataSource::Fixture,
            page,
        })
    }
}

fn provider() -> FixtureProvider {
    FixtureProvider {
        body: fixture("aapl_eod_2025-01.json"),
    }
}

fn allowed() -> Vec<String> {
    vec!["AAPL".to_string()]
}

#[test]
fn well_formed_response_yields_one_record_per_trading_day() {
    let range = DateRange::new(jan(1), jan(10)).unwrap();
    let result = provider().fetch_eod("AAPL", range).unwrap();
    let records = result.dataset.records();

    assert_eq!(records.len(), 6);
    assert!(!result.is_truncated());

    let mut keys = HashSet::new();
    for r in records {
        assert!(range.contains(r.date));
        assert!(!matches!(r.date.weekday(), Weekday::Sat | Weekday::Sun));
        assert!(keys.insert((r.symbol.clone(), r.date)), "duplicate key {:?}", r.date);
        assert!(r.is_sane(), "{:?}: {:?}", r.date, r.violations());
    }

    for pair in records.windows(2) {
        assert!(pair[0].date < pair[1].date);
    }
}

#[test]
fn narrower_range_drops_rows_outside_it() {
    let range = DateRange::new(jan(6), jan(8)).unwrap();
    let result = provider().fetch_eod("AAPL", range).unwrap();
    let dates: Vec<_> = result.dataset.records().iter().map(|r| r.date).collect();
    assert_eq!(dates, vec![jan(6), jan(7), jan(8)]);
}

#[test]
fn fetched_file_round_trips_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let range = DateRange::new(jan(1), jan(10)).unwrap();

    let fetched = provider().fetch_eod("AAPL", range).unwrap().dataset;
    let summary = fetch_to_parquet(&provider(), "AAPL", range, dir.path()).unwrap();

    assert_eq!(summary.path, dir.path().join("AAPL.parquet"));
    assert_eq!(summary.records, 6);
    assert_eq!(summary.source, DataSource::Fixture);
    assert_eq!(summary.dates, Some((jan(2), jan(10))));

    let loaded = store::read_dataset(&summary.path).unwrap();
    assert_eq!(loaded, fetched);
}

#[test]
fn rerunning_fetch_overwrites_previous_file() {
    let dir = tempfile::tempdir().unwrap();

    let wide = DateRange::new(jan(1), jan(10)).unwrap();
    let first = fetch_to_parquet(&provider(), "AAPL", wide, dir.path()).unwrap();
    assert_eq!(store::read_dataset(&first.path).unwrap().len(), 6);

    let narrow = DateRange::new(jan(2), jan(3)).unwrap();
    let second = fetch_to_parquet(&provider(), "AAPL", narrow, dir.path()).unwrap();
    assert_eq!(first.path, second.path);

    let loaded = store::read_dataset(&second.path).unwrap();
    assert_eq!(loaded.len(), 2, "second run must replace, not append");

    let parquet_files = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("parquet"))
        .count();
    assert_eq!(parquet_files, 1);
}

#[test]
fn fetched_file_passes_validation() {
    let dir = tempfile::tempdir().unwrap();
    let range = DateRange::new(jan(1), jan(10)).unwrap();
    let summary = fetch_to_parquet(&provider(), "AAPL", range, dir.path()).unwrap();

    let report = validate_file(&summary.path, &ExpectationSuite::stock_eod(&allowed())).unwrap();
    let failures: Vec<_> = report.failures().collect();
    assert!(report.success, "failures: {failures:?}");
    assert_eq!(report.row_count, 6);
    assert_eq!(report.source.as_deref(), Some(summary.path.display().to_string().as_str()));
}

#[test]
fn failed_fetch_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FixtureProvider {
        body: r#"{"error": {"code": "invalid_access_key", "message": "bad key"}}"#.to_string(),
    };
    let range = DateRange::new(jan(1), jan(10)).unwrap();

    let err = fetch_to_parquet(&provider, "AAPL", range, dir.path()).unwrap_err();
    assert!(matches!(err, DataError::AuthenticationRequired(_)));
    assert!(!dir.path().join("AAPL.parquet").exists());
}
