//! eodlab CLI: fetch and validate commands.
//!
//! Commands:
//! - `fetch`: pull EOD prices for one symbol from MarketStack and save as Parquet
//! - `validate`: check a saved Parquet file against the EOD expectation suite

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use eodlab_core::data::{fetch_to_parquet, validate_file, ExpectationSuite, MarketStackProvider};
use eodlab_core::{DateRange, Settings, ValidationReport};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "eodlab",
    about = "eodlab CLI: MarketStack EOD ingestion and validation"
)]
struct Cli {
    /// Path to a TOML config file. Defaults to ./config.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch EOD prices for one symbol and write {data_dir}/{SYMBOL}.parquet.
    Fetch {
        /// Symbol to fetch (e.g., AAPL).
        symbol: String,

        /// Start date (YYYY-MM-DD).
        #[arg(long, default_value = "2025-01-01")]
        start: String,

        /// End date (YYYY-MM-DD).
        #[arg(long, default_value = "2025-01-10")]
        end: String,

        /// Output directory. Defaults to the configured data_dir (data/raw).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Number of results requested in the single page.
        #[arg(long)]
        limit: Option<u32>,

        /// Number of results to skip.
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Validate a Parquet file produced by `fetch`.
    Validate {
        /// Path to the Parquet file.
        path: PathBuf,

        /// Print the full report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Fetch {
            symbol,
            start,
            end,
            data_dir,
            limit,
            offset,
        } => run_fetch(&settings, &symbol, &start, &end, data_dir, limit, offset),
        Commands::Validate { path, json } => run_validate(&settings, path, json),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
}

fn run_fetch(
    settings: &Settings,
    symbol: &str,
    start: &str,
    end: &str,
    data_dir: Option<PathBuf>,
    limit: Option<u32>,
    offset: u32,
) -> Result<()> {
    let range = DateRange::new(parse_date(start)?, parse_date(end)?)?;
    let api_key = settings.require_api_key()?;
    let data_dir = data_dir.unwrap_or_else(|| settings.data_dir.clone());

    let provider = MarketStackProvider::new(
        api_key,
        settings.base_url.as_str(),
        Duration::from_secs(settings.request_timeout_secs),
    )?
    .with_page(limit.unwrap_or(settings.page_limit), offset);
    tracing::debug!(symbol, data_dir = %data_dir.display(), "starting fetch");

    let summary = fetch_to_parquet(&provider, symbol, range, &data_dir)
        .with_context(|| format!("fetching {symbol} for {} to {}", range.start(), range.end()))?;

    println!(
        "Saved {} records for {} to {}",
        summary.records,
        summary.symbol,
        summary.path.display()
    );
    if let Some((first, last)) = summary.dates {
        println!("  Dates: {first} to {last}");
    }
    if summary.truncated {
        println!("WARNING: provider holds more rows than one page; raise --limit");
    }
    Ok(())
}

fn run_validate(settings: &Settings, path: PathBuf, json: bool) -> Result<()> {
    let suite = ExpectationSuite::stock_eod(&settings.allowed_symbols);
    let report = validate_file(&path, &suite)
        .with_context(|| format!("validating {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    // Reports only: a failing suite does not change the exit status.
    Ok(())
}

fn print_report(report: &ValidationReport) {
    println!();
    println!("=== Validation: {} ===", report.suite);
    if let Some(source) = &report.source {
        println!("File:  {source}");
    }
    println!("Rows:  {}", report.row_count);
    println!();
    for r in &report.results {
        let mark = if r.success { "PASS" } else { "FAIL" };
        println!("{mark}  {:<72} {}", r.expectation, r.observed);
    }
    println!();
    println!(
        "Successful expectations: {} / {}",
        report.successful_count(),
        report.evaluated_count()
    );
    println!("Overall: {}", if report.success { "SUCCESS" } else { "FAILED" });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_fetch_defaults() {
        let cli = Cli::try_parse_from(["eodlab", "fetch", "AAPL"]).unwrap();
        match cli.command {
            Commands::Fetch {
                symbol,
                start,
                end,
                data_dir,
                limit,
                offset,
            } => {
                assert_eq!(symbol, "AAPL");
                assert_eq!(start, "2025-01-01");
                assert_eq!(end, "2025-01-10");
                assert!(data_dir.is_none());
                assert!(limit.is_none());
                assert_eq!(offset, 0);
            }
            Commands::Validate { .. } => panic!("expected fetch"),
        }
    }

    #[test]
    fn cli_parses_validate_with_global_config() {
        let cli = Cli::try_parse_from([
            "eodlab",
            "validate",
            "data/raw/AAPL.parquet",
            "--json",
            "--config",
            "x.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        match cli.command {
            Commands::Validate { path, json } => {
                assert_eq!(path, PathBuf::from("data/raw/AAPL.parquet"));
                assert!(json);
            }
            Commands::Fetch { .. } => panic!("expected validate"),
        }
    }

    #[test]
    fn fetch_requires_symbol() {
        assert!(Cli::try_parse_from(["eodlab", "fetch"]).is_err());
    }

    #[test]
    fn bad_date_is_rejected() {
        assert!(parse_date("2025-13-01").is_err());
        assert!(parse_date("2025-01-02").is_ok());
    }

    #[test]
    fn inverted_range_is_rejected_before_any_request() {
        let mut settings = Settings::default();
        settings.api_key = Some("k".into());
        let err =
            run_fetch(&settings, "AAPL", "2025-01-10", "2025-01-01", None, None, 0).unwrap_err();
        assert!(err.to_string().contains("invalid date range"));
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let settings = Settings::default();
        let err =
            run_fetch(&settings, "AAPL", "2025-01-01", "2025-01-10", None, None, 0).unwrap_err();
        assert!(err.to_string().contains("API key"));
    }
}
