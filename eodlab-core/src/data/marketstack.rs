//! MarketStack data provider.
//!
//! Fetches end-of-day bars from the `/eod` endpoint with one blocking GET.
//! Authentication and rate-limit failures are mapped to their own error
//! variants; nothing is retried.

use super::provider::{DataError, DataSource, EodProvider, FetchResult, PageInfo};
use crate::domain::{DateRange, Dataset, PriceRecord};
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use std::time::Duration;

/// MarketStack `/eod` response body.
#[derive(Debug, Deserialize)]
struct EodResponse {
    pagination: Option<Pagination>,
    data: Option<Vec<EodRow>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    limit: u64,
    offset: u64,
    count: u64,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct EodRow {
    date: String,
    symbol: Option<String>,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
    adj_close: Option<f64>,
}

/// MarketStack error codes that mean the key is missing, wrong, or not entitled.
const AUTH_CODES: &[&str] = &[
    "invalid_access_key",
    "missing_access_key",
    "inactive_user",
    "function_access_restricted",
    "https_access_restricted",
];

const RATE_LIMIT_CODES: &[&str] = &["rate_limit_reached", "usage_limit_reached"];

/// MarketStack end-of-day provider.
pub struct MarketStackProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    limit: u32,
    offset: u32,
}

impl MarketStackProvider {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DataError::NetworkUnreachable(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            limit: 1000,
            offset: 0,
        })
    }

    /// Page size and offset sent with the single request.
    pub fn with_page(mut self, limit: u32, offset: u32) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// `{base_url}/eod`
    pub fn eod_url(&self) -> String {
        format!("{}/eod", self.base_url.trim_end_matches('/'))
    }

    fn query(&self, symbol: &str, range: DateRange) -> Vec<(&'static str, String)> {
        vec![
            ("access_key", self.api_key.clone()),
            ("symbols", symbol.to_string()),
            ("limit", self.limit.to_string()),
            ("offset", self.offset.to_string()),
            ("sort", "ASC".to_string()),
            ("date_from", range.start().format("%Y-%m-%d").to_string()),
            ("date_to", range.end().format("%Y-%m-%d").to_string()),
        ]
    }

    fn request(&self, symbol: &str, range: DateRange) -> Result<(u16, String), DataError> {
        let url = self.eod_url();
        tracing::info!(
            %url,
            symbol,
            date_from = %range.start(),
            date_to = %range.end(),
            limit = self.limit,
            offset = self.offset,
            "requesting MarketStack EOD"
        );

        let resp = self
            .client
            .get(&url)
            .query(&self.query(symbol, range))
            .send()
            .map_err(|e| {
                // reqwest puts the full URL (and so the key) in its Display output
                let e = e.without_url();
                if e.is_timeout() {
                    DataError::NetworkUnreachable(format!("request timed out: {e}"))
                } else {
                    DataError::NetworkUnreachable(e.to_string())
                }
            })?;

        let status = resp.status().as_u16();
        let body = resp.text().map_err(|e| {
            DataError::NetworkUnreachable(format!("failed to read body: {}", e.without_url()))
        })?;
        Ok((status, body))
    }
}

impl EodProvider for MarketStackProvider {
    fn name(&self) -> &str {
        "marketstack"
    }

    fn fetch_eod(&self, symbol: &str, range: DateRange) -> Result<FetchResult, DataError> {
        let symbol = normalize_symbol(symbol)?;
        let (status, body) = self.request(&symbol, range)?;

        if !(200..300).contains(&status) {
            let err = classify_failure(status, &body);
            tracing::error!(status, error = %err, "MarketStack request failed");
            return Err(err);
        }

        let (dataset, page) = parse_eod_body(&symbol, range, &body)?;
        tracing::info!(symbol = %symbol, records = dataset.len(), "fetched EOD records");

        let result = FetchResult {
            symbol,
            dataset,
            source: DataSource::MarketStack,
            page,
        };
        if let Some(page) = result.page.filter(|_| result.is_truncated()) {
            tracing::warn!(
                total = page.total,
                offset = page.offset,
                count = page.count,
                "response truncated by page limit; raise --limit to fetch the full range"
            );
        }
        Ok(result)
    }
}

/// Trim and upper-case a ticker, rejecting blanks.
pub fn normalize_symbol(symbol: &str) -> Result<String, DataError> {
    let s = symbol.trim().to_ascii_uppercase();
    if s.is_empty() {
        return Err(DataError::SymbolNotFound { symbol: s });
    }
    Ok(s)
}

/// Map a non-2xx response onto a DataError.
pub fn classify_failure(status: u16, body: &str) -> DataError {
    let api = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);
    let message = api
        .as_ref()
        .map(|e| format!("{}: {}", e.code, e.message))
        .unwrap_or_else(|| format!("HTTP {status}"));

    if let Some(err) = &api {
        if let Some(mapped) = classify_code(&err.code, &message) {
            return mapped;
        }
    }

    match status {
        401 | 403 => DataError::AuthenticationRequired(message),
        429 => DataError::RateLimited(message),
        _ => DataError::Api { status, message },
    }
}

fn classify_code(code: &str, message: &str) -> Option<DataError> {
    if AUTH_CODES.contains(&code) {
        Some(DataError::AuthenticationRequired(message.to_string()))
    } else if RATE_LIMIT_CODES.contains(&code) {
        Some(DataError::RateLimited(message.to_string()))
    } else {
        None
    }
}

/// Parse an `/eod` body into a dataset for `symbol`, keeping only rows in `range`.
pub fn parse_eod_body(
    symbol: &str,
    range: DateRange,
    body: &str,
) -> Result<(Dataset, Option<PageInfo>), DataError> {
    let resp: EodResponse = serde_json::from_str(body).map_err(|e| {
        DataError::ResponseFormat(format!("failed to parse response for {symbol}: {e}"))
    })?;

    if let Some(err) = resp.error {
        let message = format!("{}: {}", err.code, err.message);
        return Err(classify_code(&err.code, &message)
            .unwrap_or(DataError::Api { status: 200, message }));
    }

    let rows = resp
        .data
        .ok_or_else(|| DataError::ResponseFormat("response has no `data` array".into()))?;

    if rows.is_empty() {
        return Err(DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        });
    }

    let mut records = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        let record = row_to_record(symbol, i, row)?;

        if record.symbol != symbol {
            tracing::warn!(row = i, got = %record.symbol, "dropping row for unrequested symbol");
            continue;
        }
        if !range.contains(record.date) {
            tracing::warn!(row = i, date = %record.date, "dropping row outside requested range");
            continue;
        }
        for problem in record.violations() {
            tracing::warn!(date = %record.date, "{problem}");
        }
        records.push(record);
    }

    let fetched = records.len();
    let dataset = Dataset::new(records);
    if dataset.len() < fetched {
        tracing::warn!(dropped = fetched - dataset.len(), "dropped duplicate (symbol, date) rows");
    }

    let page = resp.pagination.map(|p| PageInfo {
        limit: p.limit,
        offset: p.offset,
        count: p.count,
        total: p.total,
    });

    Ok((dataset, page))
}

fn row_to_record(symbol: &str, index: usize, row: EodRow) -> Result<PriceRecord, DataError> {
    let bad = |what: &str| DataError::ResponseFormat(format!("row {index} ({}): {what}", row.date));

    let date = parse_api_date(&row.date).ok_or_else(|| bad("unparseable date"))?;
    let open = row.open.ok_or_else(|| bad("missing open"))?;
    let high = row.high.ok_or_else(|| bad("missing high"))?;
    let low = row.low.ok_or_else(|| bad("missing low"))?;
    let close = row.close.ok_or_else(|| bad("missing close"))?;
    let volume = row.volume.ok_or_else(|| bad("missing volume"))?;

    if !volume.is_finite() || volume < 0.0 {
        return Err(bad(&format!("volume {volume} is not a non-negative number")));
    }

    Ok(PriceRecord {
        symbol: row
            .symbol
            .as_deref()
            .map(str::to_ascii_uppercase)
            .unwrap_or_else(|| symbol.to_string()),
        date,
        open,
        high,
        low,
        close,
        volume: volume.round() as u64,
        adj_close: row.adj_close,
    })
}

/// MarketStack sends `2025-01-02T00:00:00+0000`; plain `2025-01-02` is accepted too.
pub fn parse_api_date(s: &str) -> Option<NaiveDate> {
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z")
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jan(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn range() -> DateRange {
        DateRange::new(jan(1), jan(10)).unwrap()
    }

    const BODY: &str = r#"{
        "pagination": {"limit": 1000, "offset": 0, "count": 3, "total": 3},
        "data": [
            {"open": 131.0, "high": 132.0, "low": 130.0, "close": 131.5, "volume": 1100000.0,
             "adj_close": 131.5, "symbol": "AAPL", "exchange": "XNAS", "date": "2025-01-06T00:00:00+0000"},
            {"open": 130.0, "high": 131.0, "low": 129.0, "close": 130.5, "volume": 1000000.0,
             "adj_close": 130.5, "symbol": "AAPL", "exchange": "XNAS", "date": "2025-01-03T00:00:00+0000"},
            {"open": 132.0, "high": 133.0, "low": 131.0, "close": 132.5, "volume": 900000,
             "adj_close": null, "symbol": "AAPL", "exchange": "XNAS", "date": "2025-01-07"}
        ]
    }"#;

    #[test]
    fn parses_rows_sorted_by_date() {
        let (ds, page) = parse_eod_body("AAPL", range(), BODY).unwrap();
        assert_eq!(ds.len(), 3);
        let dates: Vec<_> = ds.records().iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![jan(3), jan(6), jan(7)]);
        assert_eq!(ds.records()[0].volume, 1_000_000);
        assert_eq!(ds.records()[2].adj_close, None);
        assert!(ds.records().iter().all(|r| r.is_sane()));
        assert!(!page.unwrap().is_truncated());
    }

    #[test]
    fn duplicate_days_are_collapsed() {
        let body = r#"{"data": [
            {"open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5, "volume": 10, "symbol": "AAPL", "date": "2025-01-03"},
            {"open": 9.0, "high": 9.0, "low": 9.0, "close": 9.0, "volume": 10, "symbol": "AAPL", "date": "2025-01-03"}
        ]}"#;
        let (ds, _) = parse_eod_body("AAPL", range(), body).unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.records()[0].open, 1.0);
    }

    #[test]
    fn rows_outside_range_are_dropped() {
        let body = r#"{"data": [
            {"open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5, "volume": 10, "symbol": "AAPL", "date": "2024-12-31"},
            {"open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5, "volume": 10, "symbol": "AAPL", "date": "2025-01-02"}
        ]}"#;
        let (ds, _) = parse_eod_body("AAPL", range(), body).unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.records()[0].date, jan(2));
    }

    #[test]
    fn negative_volume_is_a_format_error() {
        let body = r#"{"data": [
            {"open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5, "volume": -5, "symbol": "AAPL", "date": "2025-01-02"}
        ]}"#;
        let err = parse_eod_body("AAPL", range(), body).unwrap_err();
        assert!(matches!(err, DataError::ResponseFormat(_)), "got {err:?}");
    }

    #[test]
    fn missing_price_is_a_format_error() {
        let body = r#"{"data": [{"open": null, "high": 2.0, "low": 0.5, "close": 1.5, "volume": 5, "date": "2025-01-02"}]}"#;
        let err = parse_eod_body("AAPL", range(), body).unwrap_err();
        assert!(err.to_string().contains("missing open"));
    }

    #[test]
    fn empty_data_is_symbol_not_found() {
        let err = parse_eod_body("ZZZZ", range(), r#"{"data": []}"#).unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound { .. }));
    }

    #[test]
    fn garbage_body_is_a_format_error() {
        let err = parse_eod_body("AAPL", range(), "<html>oops</html>").unwrap_err();
        assert!(matches!(err, DataError::ResponseFormat(_)));
    }

    #[test]
    fn truncated_page_is_detected() {
        let body = r#"{"pagination": {"limit": 1, "offset": 0, "count": 1, "total": 5},
            "data": [{"open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5, "volume": 5, "symbol": "AAPL", "date": "2025-01-02"}]}"#;
        let (_, page) = parse_eod_body("AAPL", range(), body).unwrap();
        assert!(page.unwrap().is_truncated());
    }

    #[test]
    fn invalid_key_maps_to_auth_error() {
        let body = r#"{"error": {"code": "invalid_access_key", "message": "You have not supplied a valid API Access Key."}}"#;
        assert!(matches!(classify_failure(401, body), DataError::AuthenticationRequired(_)));
        // some plans answer 200 with an error envelope
        assert!(matches!(
            parse_eod_body("AAPL", range(), body).unwrap_err(),
            DataError::AuthenticationRequired(_)
        ));
    }

    #[test]
    fn rate_limit_maps_to_rate_limited() {
        let body = r#"{"error": {"code": "rate_limit_reached", "message": "Too many requests."}}"#;
        assert!(matches!(classify_failure(429, body), DataError::RateLimited(_)));
        assert!(matches!(classify_failure(429, "not json"), DataError::RateLimited(_)));
    }

    #[test]
    fn other_status_maps_to_api_error() {
        match classify_failure(500, "boom") {
            DataError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "HTTP 500");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn date_formats() {
        assert_eq!(parse_api_date("2025-01-02T00:00:00+0000"), Some(jan(2)));
        assert_eq!(parse_api_date("2025-01-02"), Some(jan(2)));
        assert_eq!(parse_api_date("01/02/2025"), None);
    }

    #[test]
    fn symbol_normalization() {
        assert_eq!(normalize_symbol(" aapl ").unwrap(), "AAPL");
        assert!(normalize_symbol("   ").is_err());
    }

    #[test]
    fn url_and_query() {
        let p = MarketStackProvider::new("k", "http://localhost:1/v1/", Duration::from_secs(1))
            .unwrap()
            .with_page(50, 10);
        assert_eq!(p.eod_url(), "http://localhost:1/v1/eod");
        let q = p.query("AAPL", range());
        assert!(q.contains(&("date_from", "2025-01-01".to_string())));
        assert!(q.contains(&("date_to", "2025-01-10".to_string())));
        assert!(q.contains(&("limit", "50".to_string())));
        assert!(q.contains(&("offset", "10".to_string())));
        assert!(q.contains(&("sort", "ASC".to_string())));
    }
}
