mod analysis;
mod batch;
mod config;
mod filter;
mod models;
mod normalizer;
mod report;
mod snapshot;
mod utils;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::analysis::{OverviewStats, symbol_detail};
use crate::batch::{SheetSource, analyze_symbols, discover_sheets, load_sheet};
use crate::config::AppConfig;
use crate::filter::{Filter, FilterSet, SortKey, sort_rows};
use crate::models::NormalizedRow;
use crate::normalizer::{normalize_record, normalize_snapshot};
use crate::report::{BatchView, DetailView, SkippedView, StatsView, TableView};
use crate::snapshot::{Snapshot, SnapshotCache};

#[derive(Parser)]
#[command(name = "stock-snapshot", about = "Stock analytics snapshot explorer", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Snapshot JSON to read (overrides snapshot.path)
    #[arg(short, long, global = true, env = "STOCKSNAP_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Filtered overview table with summary metrics
    Table {
        /// Filter such as rsi=30..70, confidence=50.., trend=Bullish (repeatable)
        #[arg(short, long = "filter")]
        filters: Vec<Filter>,

        /// Sort by `earnings` (next date, undated last) or `symbol`
        #[arg(long, default_value = "earnings")]
        sort: SortKey,

        #[arg(long)]
        json: bool,
    },

    /// Drill down into one symbol
    Show {
        symbol: String,

        #[arg(long)]
        json: bool,
    },

    /// Aggregate statistics and distributions over the filtered rows
    Stats {
        #[arg(short, long = "filter")]
        filters: Vec<Filter>,

        #[arg(long)]
        json: bool,
    },

    /// Analyze custom symbol lists from the sheets of a spreadsheet workbook
    Batch {
        /// Spreadsheet (xlsx, xls, ods), single CSV, or a directory of them
        /// (overrides batch.workbook)
        #[arg(short, long)]
        workbook: Option<PathBuf>,

        /// Only analyze this sheet
        #[arg(long)]
        sheet: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// List sheets in the workbook
    Sheets {
        #[arg(short, long)]
        workbook: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "stock_snapshot=info,warn",
        1 => "stock_snapshot=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;
    let today = Local::now().date_naive();
    let snapshot_path = cli
        .snapshot
        .clone()
        .unwrap_or_else(|| config.snapshot.path.clone());

    let mut cache = SnapshotCache::new();
    let snapshot = {
        let _t = utils::Timer::start("Snapshot load");
        cache
            .load(&snapshot_path)
            .with_context(|| format!("Cannot open snapshot {:?}", snapshot_path))?
    };

    if snapshot.is_empty() {
        let source = snapshot.source().unwrap_or(snapshot_path.as_path());
        warn!("Snapshot {:?} contains no symbols", source);
    }

    match cli.command {
        Command::Table { filters, sort, json } => {
            let outcome = normalize_snapshot(&snapshot);
            let set = filter_set(&config, filters)?;
            let mut rows = set.apply(&outcome.rows, today);
            sort_rows(&mut rows, sort);

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }

            println!(
                "Showing {} of {} stocks ({} unreadable records skipped)",
                rows.len(),
                snapshot.len(),
                outcome.skipped.len()
            );
            let stats = OverviewStats::compute(rows.iter().copied(), today);
            print!(
                "{}",
                TableView {
                    rows: &rows,
                    today,
                    display: &config.display,
                }
            );
            print!(
                "{}",
                StatsView {
                    stats: &stats,
                    decimals: config.display.decimals,
                }
            );
            if cli.verbose > 0 {
                print!("{}", SkippedView(&outcome.skipped));
            }
        }

        Command::Show { symbol, json } => show_symbol(&snapshot, &symbol, today, json, &config)?,

        Command::Stats { filters, json } => {
            let outcome = normalize_snapshot(&snapshot);
            let set = filter_set(&config, filters)?;
            let rows = set.apply(&outcome.rows, today);
            let stats = OverviewStats::compute(rows.iter().copied(), today);

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                let view = StatsView {
                    stats: &stats,
                    decimals: config.display.decimals,
                };
                print!("{}", view);
            }
        }

        Command::Batch { workbook, sheet, json } => {
            let workbook = workbook.unwrap_or_else(|| config.batch.workbook.clone());
            run_batch(Arc::clone(&snapshot), &workbook, sheet.as_deref(), today, json, &config)?;
        }

        Command::Sheets { workbook } => {
            let workbook = workbook.unwrap_or_else(|| config.batch.workbook.clone());
            let Some(sources) = discover_sheets(&workbook)? else {
                println!("No workbook at {:?}; batch analysis is unavailable.", workbook);
                return Ok(());
            };
            if sources.is_empty() {
                println!("Workbook {:?} has no sheets.", workbook);
            }
            for source in &sources {
                match load_sheet(source) {
                    Ok(s) => println!("  {:<24} {} symbols", s.name, s.symbols.len()),
                    Err(e) => println!("  {:<24} error: {}", source.name(), e),
                }
            }
        }
    }

    Ok(())
}

/// Configured default filters first, then the ones given on the command line.
fn filter_set(config: &AppConfig, cli_filters: Vec<Filter>) -> Result<FilterSet> {
    let mut set = FilterSet::new(
        config
            .default_filters()
            .context("Invalid filter in [filters] default")?,
    );
    for f in cli_filters {
        set.push(f);
    }
    if !set.is_empty() {
        let active: Vec<String> = set.filters().iter().map(|f| f.to_string()).collect();
        info!("Active filters: {}", active.join(" AND "));
    }
    Ok(set)
}

fn show_symbol(
    snapshot: &Snapshot,
    symbol: &str,
    today: NaiveDate,
    json: bool,
    config: &AppConfig,
) -> Result<()> {
    let Some((key, record)) = snapshot.get(symbol) else {
        println!("{} is not in the snapshot.", symbol.trim().to_uppercase());
        return Ok(());
    };

    let row: NormalizedRow = match normalize_record(key, record) {
        Ok(row) => row,
        Err(e) => {
            warn!("{}: {}", key, e);
            println!("{}: record cannot be read ({}).", key, e);
            return Ok(());
        }
    };

    let detail = symbol_detail(&row, today);
    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        let view = DetailView {
            detail: &detail,
            decimals: config.display.decimals,
        };
        print!("{}", view);
    }
    Ok(())
}

fn run_batch(
    snapshot: Arc<Snapshot>,
    workbook: &Path,
    only: Option<&str>,
    today: NaiveDate,
    json: bool,
    config: &AppConfig,
) -> Result<()> {
    let Some(sources) = discover_sheets(workbook)? else {
        println!("No workbook at {:?}; batch analysis is unavailable.", workbook);
        return Ok(());
    };

    let sources: Vec<SheetSource> = sources
        .into_iter()
        .filter(|s| only.is_none_or(|name| s.name().eq_ignore_ascii_case(name)))
        .collect();
    if sources.is_empty() {
        println!("No matching sheets in {:?}.", workbook);
        return Ok(());
    }

    let _t = utils::Timer::start("Batch analysis");
    let mut results = Vec::new();

    for source in &sources {
        let sheet = match load_sheet(source) {
            Ok(s) => s,
            Err(e) => {
                println!("Sheet `{}`: {}", source.name(), e);
                continue;
            }
        };

        let batch_report = analyze_symbols(&snapshot, &sheet.symbols, today, |p| {
            let pct = p.fraction() * 100.0;
            if p.is_checkpoint() {
                info!("{}: {}/{} ({:.0}%)", sheet.name, p.processed, p.total, pct);
            } else {
                debug!("{}: {}/{} ({:.0}%)", sheet.name, p.processed, p.total, pct);
            }
        });

        if json {
            let invalid: Vec<_> = batch_report
                .invalid
                .iter()
                .map(|(symbol, e)| json!({ "symbol": symbol, "reason": e.to_string() }))
                .collect();
            results.push(json!({
                "sheet": sheet.name,
                "rows": batch_report.rows,
                "missing": batch_report.missing,
                "invalid": invalid,
                "stats": batch_report.stats,
            }));
        } else {
            let view = BatchView {
                sheet: &sheet.name,
                report: &batch_report,
                today,
                display: &config.display,
            };
            print!("{}", view);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    Ok(())
}
