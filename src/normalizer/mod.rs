//! Snapshot normalizer: nested per-symbol records → flat `NormalizedRow`s.
//!
//! ## Missing-field policy
//!
//! Fill-with-null. Any missing, null or malformed leaf becomes `None` and the
//! row is kept. A symbol is dropped only when its record is structurally
//! unreadable: not an object, or `technical` / `earnings` absent or not an
//! object. Dropped symbols are logged and returned in `NormalizeOutcome::skipped`.

pub mod cleaner;

use crate::models::{EarningsOutlook, Fundamentals, NormalizedRow, TechnicalSnapshot};
use crate::snapshot::{json_kind, Snapshot};
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use self::cleaner::{lookup, parse_date, parse_number, parse_text};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is {found}, expected an object")]
    NotAnObject { found: &'static str },

    #[error("section `{section}` is missing")]
    MissingSection {
        section: &'static str,
        upstream_error: Option<String>,
    },

    #[error("section `{section}` is {found}, expected an object")]
    MalformedSection {
        section: &'static str,
        found: &'static str,
    },
}

#[derive(Debug, Default)]
pub struct NormalizeOutcome {
    pub rows: Vec<NormalizedRow>,
    pub skipped: Vec<(String, RecordError)>,
}

/// Normalize every record in the snapshot, in file order.
pub fn normalize_snapshot(snapshot: &Snapshot) -> NormalizeOutcome {
    let mut outcome = NormalizeOutcome::default();

    for (symbol, record) in snapshot.records() {
        match normalize_record(symbol, record) {
            Ok(row) => outcome.rows.push(row),
            Err(e) => {
                warn!("Skipping {}: {}", symbol, e);
                outcome.skipped.push((symbol.to_string(), e));
            }
        }
    }

    debug!(
        "Normalized {} rows, skipped {}",
        outcome.rows.len(),
        outcome.skipped.len()
    );
    outcome
}

pub fn normalize_record(symbol: &str, record: &Value) -> Result<NormalizedRow, RecordError> {
    let obj = record.as_object().ok_or(RecordError::NotAnObject {
        found: json_kind(record),
    })?;
    let upstream_error = obj.get("error").and_then(parse_text);

    let technical = required_section(record, "technical", &upstream_error)?;
    let earnings = required_section(record, "earnings", &upstream_error)?;

    Ok(NormalizedRow {
        symbol: symbol.to_string(),
        status: obj.get("status").and_then(parse_text),
        error: upstream_error,
        technical: technical_snapshot(technical),
        earnings: earnings_outlook(earnings),
        fundamentals: fundamentals(record),
    })
}

fn required_section<'a>(
    record: &'a Value,
    section: &'static str,
    upstream_error: &Option<String>,
) -> Result<&'a Value, RecordError> {
    match record.get(section) {
        None | Some(Value::Null) => Err(RecordError::MissingSection {
            section,
            upstream_error: upstream_error.clone(),
        }),
        Some(v) if v.is_object() => Ok(v),
        Some(v) => Err(RecordError::MalformedSection {
            section,
            found: json_kind(v),
        }),
    }
}

// ── Sections ──────────────────────────────────────────────────────────────────

fn number_at(section: &Value, path: &[&str]) -> Option<f64> {
    lookup(section, path).and_then(parse_number)
}

fn technical_snapshot(t: &Value) -> TechnicalSnapshot {
    TechnicalSnapshot {
        last_close: number_at(t, &["last_close"]),
        last_volume: number_at(t, &["last_volume"]),
        rsi: number_at(t, &["rsi"]),
        trend: lookup(t, &["trend"]).and_then(parse_text),
        ma_20: number_at(t, &["ma_20"]),
        ma_50: number_at(t, &["ma_50"]),
        ma_200: number_at(t, &["ma_200"]),
        macd_line: number_at(t, &["macd_line"]),
        macd_signal: number_at(t, &["macd_signal"]),
    }
}

fn earnings_outlook(e: &Value) -> EarningsOutlook {
    let mut historical_dates: Vec<_> = lookup(e, &["historical_dates"])
        .and_then(Value::as_array)
        .map(|dates| dates.iter().filter_map(parse_date).collect())
        .unwrap_or_default();
    historical_dates.sort();
    historical_dates.dedup();

    let day_intervals: Vec<f64> = lookup(e, &["prediction_metadata", "day_intervals"])
        .and_then(Value::as_array)
        .map(|xs| xs.iter().filter_map(parse_number).collect())
        .unwrap_or_default();

    EarningsOutlook {
        next_earnings: lookup(e, &["next_earnings_prediction"]).and_then(parse_date),
        historical_dates,
        confidence_score: number_at(e, &["prediction_metadata", "confidence_score"]),
        day_intervals,
    }
}

/// `fundamental` is optional; anything unreadable yields empty maps.
fn fundamentals(record: &Value) -> Fundamentals {
    let section = |name: &str| lookup(record, &["fundamental", name]).and_then(Value::as_object);

    let historical: BTreeMap<String, BTreeMap<NaiveDate, f64>> = section("historical")
        .map(|metrics| {
            metrics
                .iter()
                .filter_map(|(metric, series)| {
                    let points: BTreeMap<_, _> = series
                        .as_object()?
                        .iter()
                        .filter_map(|(date, v)| {
                            Some((cleaner::parse_date_str(date)?, parse_number(v)?))
                        })
                        .collect();
                    Some((metric.clone(), points))
                })
                .collect()
        })
        .unwrap_or_default();

    let predictions: BTreeMap<String, Option<f64>> = section("predictions")
        .map(|metrics| {
            metrics
                .iter()
                .map(|(metric, v)| (metric.clone(), parse_number(v)))
                .collect()
        })
        .unwrap_or_default();

    Fundamentals { historical, predictions }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
