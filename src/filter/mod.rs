//! Row filters for the overview table.
//!
//! Filters AND together and are applied in order. A row with no value in a
//! filtered field never passes that filter, whatever the bounds are.

use crate::analysis::days_until;
use crate::models::NormalizedRow;
use crate::normalizer::cleaner::{parse_date_str, parse_number_str};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterParseError {
    #[error("filter `{0}` must look like field=value")]
    MissingOperator(String),

    #[error("unknown filter field `{0}`")]
    UnknownField(String),

    #[error("invalid bound `{bound}` for `{field}`")]
    BadBound { field: String, bound: String },

    #[error("`{field}` range has min above max")]
    EmptyRange { field: String },

    #[error("`{0}` needs a value to match")]
    EmptyValue(String),
}

// ── Fields ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericField {
    LastClose,
    LastVolume,
    Rsi,
    Ma20,
    Ma50,
    Ma200,
    MacdLine,
    MacdSignal,
    Confidence,
    DaysUntilEarnings,
    Revenue,
    NetIncome,
    Eps,
}

impl NumericField {
    pub const ALL: [NumericField; 13] = [
        Self::LastClose,
        Self::LastVolume,
        Self::Rsi,
        Self::Ma20,
        Self::Ma50,
        Self::Ma200,
        Self::MacdLine,
        Self::MacdSignal,
        Self::Confidence,
        Self::DaysUntilEarnings,
        Self::Revenue,
        Self::NetIncome,
        Self::Eps,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::LastClose => "last_close",
            Self::LastVolume => "last_volume",
            Self::Rsi => "rsi",
            Self::Ma20 => "ma_20",
            Self::Ma50 => "ma_50",
            Self::Ma200 => "ma_200",
            Self::MacdLine => "macd_line",
            Self::MacdSignal => "macd_signal",
            Self::Confidence => "confidence",
            Self::DaysUntilEarnings => "days",
            Self::Revenue => "revenue",
            Self::NetIncome => "net_income",
            Self::Eps => "eps",
        }
    }

    pub fn value(self, row: &NormalizedRow, today: NaiveDate) -> Option<f64> {
        let t = &row.technical;
        match self {
            Self::LastClose => t.last_close,
            Self::LastVolume => t.last_volume,
            Self::Rsi => t.rsi,
            Self::Ma20 => t.ma_20,
            Self::Ma50 => t.ma_50,
            Self::Ma200 => t.ma_200,
            Self::MacdLine => t.macd_line,
            Self::MacdSignal => t.macd_signal,
            Self::Confidence => row.earnings.confidence_score,
            Self::DaysUntilEarnings => {
                days_until(row.earnings.next_earnings, today).map(|d| d as f64)
            }
            Self::Revenue => row.predicted_revenue(),
            Self::NetIncome => row.predicted_net_income(),
            Self::Eps => row.predicted_eps(),
        }
    }
}

impl FromStr for NumericField {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| FilterParseError::UnknownField(s.trim().to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Trend,
    Status,
}

impl TextField {
    pub fn name(self) -> &'static str {
        match self {
            Self::Trend => "trend",
            Self::Status => "status",
        }
    }

    pub fn value(self, row: &NormalizedRow) -> Option<&str> {
        match self {
            Self::Trend => row.technical.trend.as_deref(),
            Self::Status => row.status.as_deref(),
        }
    }
}

// ── Filter ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Inclusive numeric range; either bound may be open.
    Range {
        field: NumericField,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// Inclusive range over the next earnings date.
    EarningsDate {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
    Exact { field: TextField, value: String },
}

impl Filter {
    pub fn range(field: NumericField, min: Option<f64>, max: Option<f64>) -> Self {
        Self::Range { field, min, max }
    }

    pub fn matches(&self, row: &NormalizedRow, today: NaiveDate) -> bool {
        match self {
            Self::Range { field, min, max } => field
                .value(row, today)
                .is_some_and(|v| in_bounds(&v, min.as_ref(), max.as_ref())),
            Self::EarningsDate { start, end } => row
                .earnings
                .next_earnings
                .is_some_and(|d| in_bounds(&d, start.as_ref(), end.as_ref())),
            Self::Exact { field, value } => field.value(row) == Some(value.as_str()),
        }
    }
}

fn in_bounds<T: PartialOrd>(v: &T, min: Option<&T>, max: Option<&T>) -> bool {
    min.is_none_or(|m| v >= m) && max.is_none_or(|m| v <= m)
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn bound<T: fmt::Display>(b: &Option<T>) -> String {
            b.as_ref().map(|v| v.to_string()).unwrap_or_default()
        }
        match self {
            Self::Range { field, min, max } => {
                write!(f, "{}={}..{}", field.name(), bound(min), bound(max))
            }
            Self::EarningsDate { start, end } => {
                write!(f, "earnings={}..{}", bound(start), bound(end))
            }
            Self::Exact { field, value } => write!(f, "{}={}", field.name(), value),
        }
    }
}

/// `rsi=30..70`, `confidence=50..`, `days=..30`,
/// `earnings=2025-04-01..2025-05-15`, `trend=Bullish`, `rsi=50` (exact value).
impl FromStr for Filter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, text) = s
            .split_once('=')
            .ok_or_else(|| FilterParseError::MissingOperator(s.to_string()))?;
        let name = name.trim().to_lowercase();
        let text = text.trim();

        let text_field = match name.as_str() {
            "trend" => Some(TextField::Trend),
            "status" => Some(TextField::Status),
            _ => None,
        };
        if let Some(field) = text_field {
            if text.is_empty() {
                return Err(FilterParseError::EmptyValue(name));
            }
            return Ok(Self::Exact { field, value: text.to_string() });
        }

        if name == "earnings" {
            let (start, end) = parse_bounds(&name, text, parse_date_str)?;
            return Ok(Self::EarningsDate { start, end });
        }

        let field: NumericField = name.parse()?;
        let (min, max) = parse_bounds(&name, text, parse_number_str)?;
        Ok(Self::range(field, min, max))
    }
}

fn parse_bounds<T: PartialOrd + Clone>(
    field: &str,
    text: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<(Option<T>, Option<T>), FilterParseError> {
    let one = |b: &str| -> Result<Option<T>, FilterParseError> {
        let b = b.trim();
        if b.is_empty() {
            return Ok(None);
        }
        parse(b).map(Some).ok_or_else(|| FilterParseError::BadBound {
            field: field.to_string(),
            bound: b.to_string(),
        })
    };

    let (min, max) = match text.split_once("..") {
        Some((lo, hi)) => (one(lo)?, one(hi)?),
        None => {
            let exact = one(text)?;
            if exact.is_none() {
                return Err(FilterParseError::EmptyValue(field.to_string()));
            }
            (exact.clone(), exact)
        }
    };

    if let (Some(lo), Some(hi)) = (&min, &max) {
        if lo.partial_cmp(hi) == Some(Ordering::Greater) {
            return Err(FilterParseError::EmptyRange { field: field.to_string() });
        }
    }
    Ok((min, max))
}

// ── Filter set ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    pub fn push(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Apply each filter in sequence to the surviving rows.
    pub fn apply<'a>(&self, rows: &'a [NormalizedRow], today: NaiveDate) -> Vec<&'a NormalizedRow> {
        let mut selected: Vec<&NormalizedRow> = rows.iter().collect();
        for filter in &self.filters {
            let before = selected.len();
            selected.retain(|row| filter.matches(row, today));
            debug!("{}: {} → {} rows", filter, before, selected.len());
        }
        selected
    }
}

// ── Sorting ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Next earnings date ascending, undated rows last.
    #[default]
    Earnings,
    Symbol,
}

impl FromStr for SortKey {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "earnings" => Ok(Self::Earnings),
            "symbol" => Ok(Self::Symbol),
            other => Err(FilterParseError::UnknownField(other.to_string())),
        }
    }
}

pub fn sort_rows(rows: &mut [&NormalizedRow], key: SortKey) {
    match key {
        SortKey::Earnings => rows.sort_by(|a, b| {
            match (a.earnings.next_earnings, b.earnings.next_earnings) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
            .then_with(|| a.symbol.cmp(&b.symbol))
        }),
        SortKey::Symbol => rows.sort_by(|a, b| a.symbol.cmp(&b.symbol)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
