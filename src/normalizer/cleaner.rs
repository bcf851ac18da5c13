//! Permissive value parsers. Every function here returns `None` instead of
//! failing; the normalizer relies on that to keep bad leaves isolated.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

const PLACEHOLDERS: &[&str] = &["", "N/A", "NA", "NaN", "nan", "-", "—", "None", "null"];

// ── Lookup ────────────────────────────────────────────────────────────────────

/// Walk `path` through nested objects. Nulls and non-objects along the way
/// resolve to `None`.
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = value;
    for key in path {
        cur = cur.as_object()?.get(*key)?;
    }
    if cur.is_null() { None } else { Some(cur) }
}

// ── Numbers ───────────────────────────────────────────────────────────────────

/// Parse a numeric string.
/// "1,234.5" → 1234.5 | " 82 " → 82.0 | "12.5%" → 12.5 | "abc" → None
pub fn parse_number_str(s: &str) -> Option<f64> {
    let s = s.trim();
    if PLACEHOLDERS.contains(&s) {
        return None;
    }
    let cleaned = s.trim_end_matches('%').replace(',', "");
    let n: f64 = cleaned.trim().parse().ok()?;
    n.is_finite().then_some(n)
}

pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_number_str(s),
        _ => None,
    }
}

// ── Dates ─────────────────────────────────────────────────────────────────────

/// Parse dates: ISO date, ISO date-time, RFC 3339, "Apr 24, 2025",
/// "24/04/2025" or "24 Apr 2025".
pub fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if PLACEHOLDERS.contains(&s) {
        return None;
    }

    for fmt in ["%Y-%m-%d", "%b %d, %Y", "%d/%m/%Y", "%d %b %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }

    None
}

pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    value.as_str().and_then(parse_date_str)
}

// ── Text ──────────────────────────────────────────────────────────────────────

/// Non-empty trimmed string, or `None`.
pub fn parse_text(value: &Value) -> Option<String> {
    let s = value.as_str()?.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

pub fn normalise_symbol(s: &str) -> String {
    s.trim().to_uppercase()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
