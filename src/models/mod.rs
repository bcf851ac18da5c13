use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

// ── Normalized row ────────────────────────────────────────────────────────────

/// One symbol's snapshot record, flattened. `None` means "no value".
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NormalizedRow {
    pub symbol: String,
    pub status: Option<String>,
    pub error: Option<String>,
    pub technical: TechnicalSnapshot,
    pub earnings: EarningsOutlook,
    pub fundamentals: Fundamentals,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TechnicalSnapshot {
    pub last_close: Option<f64>,
    pub last_volume: Option<f64>,
    pub rsi: Option<f64>,
    pub trend: Option<String>,
    pub ma_20: Option<f64>,
    pub ma_50: Option<f64>,
    pub ma_200: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct EarningsOutlook {
    pub next_earnings: Option<NaiveDate>,
    /// Sorted ascending; unparseable entries are dropped.
    pub historical_dates: Vec<NaiveDate>,
    pub confidence_score: Option<f64>,
    pub day_intervals: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Fundamentals {
    /// metric → (date → value)
    pub historical: BTreeMap<String, BTreeMap<NaiveDate, f64>>,
    /// metric → predicted value
    pub predictions: BTreeMap<String, Option<f64>>,
}

// Prediction keys as they appear in the snapshot
pub const TOTAL_REVENUE: &str = "Total Revenue";
pub const NET_INCOME: &str = "Net Income";
pub const BASIC_EPS: &str = "Basic EPS";

impl Fundamentals {
    pub fn prediction(&self, metric: &str) -> Option<f64> {
        self.predictions.get(metric).copied().flatten()
    }
}

impl NormalizedRow {
    pub fn predicted_revenue(&self) -> Option<f64> {
        self.fundamentals.prediction(TOTAL_REVENUE)
    }

    pub fn predicted_net_income(&self) -> Option<f64> {
        self.fundamentals.prediction(NET_INCOME)
    }

    pub fn predicted_eps(&self) -> Option<f64> {
        self.fundamentals.prediction(BASIC_EPS)
    }
}

// ── Test fixtures ─────────────────────────────────────────────────────────────
