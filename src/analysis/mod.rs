//! Derived metrics: per-row deltas and signals, plus aggregates over whatever
//! rows are currently selected. Aggregates skip `None` per field.

use crate::models::NormalizedRow;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

// ── Scalar metrics ────────────────────────────────────────────────────────────

/// Whole days from `today` to `date`; negative once the date has passed.
pub fn days_until(date: Option<NaiveDate>, today: NaiveDate) -> Option<i64> {
    date.map(|d| (d - today).num_days())
}

/// Percentage change from the last historical value to the prediction.
/// A zero base yields 0 rather than an infinite or NaN result.
pub fn change_pct(last_historical: f64, predicted: f64) -> f64 {
    if last_historical == 0.0 {
        return 0.0;
    }
    (predicted - last_historical) / last_historical * 100.0
}

// ── Aggregates ────────────────────────────────────────────────────────────────

pub fn mean(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Count of each present value, ordered by key.
pub fn distribution<K: Ord>(values: impl IntoIterator<Item = Option<K>>) -> BTreeMap<K, usize> {
    let mut counts = BTreeMap::new();
    for v in values.into_iter().flatten() {
        *counts.entry(v).or_insert(0) += 1;
    }
    counts
}

/// Most frequent present value; ties go to the smallest key.
pub fn mode<K: Ord + Clone>(values: impl IntoIterator<Item = Option<K>>) -> Option<K> {
    let counts = distribution(values);
    let mut best: Option<(&K, usize)> = None;
    for (k, n) in &counts {
        if best.is_none_or(|(_, m)| *n > m) {
            best = Some((k, *n));
        }
    }
    best.map(|(k, _)| k.clone())
}

pub fn is_bullish(trend: Option<&str>) -> bool {
    trend.is_some_and(|t| t.to_lowercase().contains("bullish"))
}

/// Summary over a set of rows.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OverviewStats {
    pub rows: usize,
    pub avg_confidence: Option<f64>,
    pub avg_rsi: Option<f64>,
    pub avg_days_until_earnings: Option<f64>,
    pub confidence_mode: Option<i64>,
    pub bullish: usize,
    pub trend_distribution: BTreeMap<String, usize>,
    pub earnings_by_date: BTreeMap<NaiveDate, usize>,
}

impl OverviewStats {
    pub fn compute<'a>(
        rows: impl IntoIterator<Item = &'a NormalizedRow>,
        today: NaiveDate,
    ) -> Self {
        let rows: Vec<&NormalizedRow> = rows.into_iter().collect();

        Self {
            rows: rows.len(),
            avg_confidence: mean(rows.iter().map(|r| r.earnings.confidence_score)),
            avg_rsi: mean(rows.iter().map(|r| r.technical.rsi)),
            avg_days_until_earnings: mean(
                rows.iter()
                    .map(|r| days_until(r.earnings.next_earnings, today).map(|d| d as f64)),
            ),
            confidence_mode: mode(
                rows.iter()
                    .map(|r| r.earnings.confidence_score.map(|c| c.round() as i64)),
            ),
            bullish: rows
                .iter()
                .filter(|r| is_bullish(r.technical.trend.as_deref()))
                .count(),
            trend_distribution: distribution(rows.iter().map(|r| r.technical.trend.clone())),
            earnings_by_date: distribution(rows.iter().map(|r| r.earnings.next_earnings)),
        }
    }
}

// ── Drill-down ────────────────────────────────────────────────────────────────

/// Historical vs predicted value of one fundamental metric.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricComparison {
    pub metric: String,
    pub last_date: Option<NaiveDate>,
    pub last_historical: Option<f64>,
    /// last − previous historical point
    pub last_delta: Option<f64>,
    pub predicted: Option<f64>,
    pub change_pct: Option<f64>,
}

/// Predicted metrics first (in key order), then metrics with history only.
pub fn metric_comparisons(row: &NormalizedRow) -> Vec<MetricComparison> {
    let f = &row.fundamentals;
    let historical_only = f
        .historical
        .keys()
        .filter(|k| !f.predictions.contains_key(*k));

    f.predictions
        .keys()
        .chain(historical_only)
        .map(|metric| {
            let series = f.historical.get(metric);
            let mut latest = series.into_iter().flat_map(|s| s.iter().rev());
            let last = latest.next();
            let previous = latest.next();
            let predicted = f.prediction(metric);

            MetricComparison {
                metric: metric.clone(),
                last_date: last.map(|(d, _)| *d),
                last_historical: last.map(|(_, v)| *v),
                last_delta: last.zip(previous).map(|((_, l), (_, p))| l - p),
                predicted,
                change_pct: last.zip(predicted).map(|((_, l), p)| change_pct(*l, p)),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PricePosition {
    Above,
    Below,
    At,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MacdBias {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RsiZone {
    Oversold,
    Neutral,
    Overbought,
}

impl fmt::Display for PricePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Above => "above",
            Self::Below => "below",
            Self::At => "at",
        })
    }
}

impl fmt::Display for MacdBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
            Self::Neutral => "neutral",
        })
    }
}

impl fmt::Display for RsiZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Oversold => "oversold",
            Self::Neutral => "neutral",
            Self::Overbought => "overbought",
        })
    }
}

pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TechnicalSignals {
    pub vs_ma_20: Option<PricePosition>,
    pub vs_ma_50: Option<PricePosition>,
    pub vs_ma_200: Option<PricePosition>,
    pub macd: Option<MacdBias>,
    pub rsi_zone: Option<RsiZone>,
}

fn position(price: Option<f64>, reference: Option<f64>) -> Option<PricePosition> {
    let (p, r) = price.zip(reference)?;
    Some(if p > r {
        PricePosition::Above
    } else if p < r {
        PricePosition::Below
    } else {
        PricePosition::At
    })
}

pub fn technical_signals(row: &NormalizedRow) -> TechnicalSignals {
    let t = &row.technical;

    let macd = t.macd_line.zip(t.macd_signal).map(|(line, signal)| {
        if line > signal {
            MacdBias::Bullish
        } else if line < signal {
            MacdBias::Bearish
        } else {
            MacdBias::Neutral
        }
    });

    let rsi_zone = t.rsi.map(|rsi| {
        if rsi < RSI_OVERSOLD {
            RsiZone::Oversold
        } else if rsi > RSI_OVERBOUGHT {
            RsiZone::Overbought
        } else {
            RsiZone::Neutral
        }
    });

    TechnicalSignals {
        vs_ma_20: position(t.last_close, t.ma_20),
        vs_ma_50: position(t.last_close, t.ma_50),
        vs_ma_200: position(t.last_close, t.ma_200),
        macd,
        rsi_zone,
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EarningsCadence {
    pub mean_interval_days: Option<f64>,
    pub last_reported: Option<NaiveDate>,
    /// Days between the last reported date and the predicted next one.
    pub predicted_gap_days: Option<i64>,
}

pub fn earnings_cadence(row: &NormalizedRow) -> EarningsCadence {
    let e = &row.earnings;
    let last_reported = e.historical_dates.last().copied();

    EarningsCadence {
        mean_interval_days: mean(e.day_intervals.iter().copied().map(Some)),
        last_reported,
        predicted_gap_days: last_reported
            .zip(e.next_earnings)
            .map(|(last, next)| (next - last).num_days()),
    }
}

/// Everything the drill-down view shows for one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolDetail<'a> {
    pub row: &'a NormalizedRow,
    pub days_until_earnings: Option<i64>,
    pub comparisons: Vec<MetricComparison>,
    pub signals: TechnicalSignals,
    pub cadence: EarningsCadence,
}

pub fn symbol_detail(row: &NormalizedRow, today: NaiveDate) -> SymbolDetail<'_> {
    SymbolDetail {
        row,
        days_until_earnings: days_until(row.earnings.next_earnings, today),
        comparisons: metric_comparisons(row),
        signals: technical_signals(row),
        cadence: earnings_cadence(row),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::complete_record;
    use crate::normalizer::normalize_record;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row() -> NormalizedRow {
        normalize_record("AAPL", &complete_record()).unwrap()
    }

    #[test]
    fn test_change_pct_zero_base() {
        assert_eq!(change_pct(0.0, 50.0), 0.0);
        assert_eq!(change_pct(0.0, 0.0), 0.0);
        assert_eq!(change_pct(100.0, 150.0), 50.0);
        assert_eq!(change_pct(200.0, 150.0), -25.0);
    }

    #[test]
    fn test_days_until() {
        let today = date(2025, 3, 28);
        assert_eq!(days_until(Some(date(2025, 4, 24)), today), Some(27));
        assert_eq!(days_until(Some(date(2025, 3, 20)), today), Some(-8));
        assert_eq!(days_until(None, today), None);
    }

    #[test]
    fn test_mean_skips_missing() {
        assert_eq!(mean([Some(10.0), None, Some(20.0)]), Some(15.0));
        assert_eq!(mean([None, None]), None);
        assert_eq!(mean(Vec::<Option<f64>>::new()), None);
    }

    #[test]
    fn test_mode_and_distribution() {
        let trends = ["Bullish", "Bearish", "Bullish", "Neutral"]
            .map(|s| Some(s.to_string()))
            .into_iter()
            .chain([None]);
        let dist = distribution(trends);
        assert_eq!(dist["Bullish"], 2);
        assert_eq!(dist.len(), 3);

        assert_eq!(mode([Some(80), Some(70), Some(80), None]), Some(80));
        // tie → smallest
        assert_eq!(mode([Some(90), Some(70)]), Some(70));
        assert_eq!(mode::<i64>([None]), None);
    }

    #[test]
    fn test_is_bullish_case_insensitive() {
        assert!(is_bullish(Some("Strong BULLISH")));
        assert!(is_bullish(Some("bullish")));
        assert!(!is_bullish(Some("Bearish")));
        assert!(!is_bullish(None));
    }

    #[test]
    fn test_overview_stats() {
        let a = row();
        let mut b = row();
        b.symbol = "BBB".into();
        b.technical.trend = Some("Bearish".into());
        b.technical.rsi = None;
        b.earnings.confidence_score = Some(60.0);
        b.earnings.next_earnings = None;

        let stats = OverviewStats::compute([&a, &b], date(2025, 4, 14));
        assert_eq!(stats.rows, 2);
        assert_eq!(stats.avg_confidence, Some(71.0));
        assert_eq!(stats.avg_rsi, Some(58.2));
        assert_eq!(stats.avg_days_until_earnings, Some(10.0));
        assert_eq!(stats.confidence_mode, Some(60));
        assert_eq!(stats.bullish, 1);
        assert_eq!(stats.trend_distribution.len(), 2);
        assert_eq!(stats.earnings_by_date[&date(2025, 4, 24)], 1);
    }

    #[test]
    fn test_metric_comparisons() {
        let comps = metric_comparisons(&row());
        let eps = comps.iter().find(|c| c.metric == "Basic EPS").unwrap();

        assert_eq!(eps.last_date, Some(date(2024, 12, 31)));
        assert_eq!(eps.last_historical, Some(6.11));
        assert!((eps.last_delta.unwrap() - (-0.05)).abs() < 1e-9);
        assert_eq!(eps.predicted, Some(6.5));
        assert!((eps.change_pct.unwrap() - 6.382_978_7).abs() < 1e-6);
    }

    #[test]
    fn test_metric_comparison_zero_base_and_history_only() {
        let mut r = row();
        r.fundamentals
            .historical
            .insert("Free Cash Flow".into(), [(date(2024, 12, 31), 0.0)].into());
        r.fundamentals.predictions.insert("Free Cash Flow".into(), Some(50.0));
        r.fundamentals
            .historical
            .insert("Total Assets".into(), [(date(2024, 12, 31), 10.0)].into());

        let comps = metric_comparisons(&r);
        let fcf = comps.iter().find(|c| c.metric == "Free Cash Flow").unwrap();
        assert_eq!(fcf.change_pct, Some(0.0));
        assert_eq!(fcf.last_delta, None);

        let assets = comps.last().unwrap();
        assert_eq!(assets.metric, "Total Assets");
        assert_eq!(assets.predicted, None);
        assert_eq!(assets.change_pct, None);
    }

    #[test]
    fn test_technical_signals() {
        let s = technical_signals(&row());
        assert_eq!(s.vs_ma_20, Some(PricePosition::Above));
        assert_eq!(s.vs_ma_200, Some(PricePosition::Above));
        assert_eq!(s.macd, Some(MacdBias::Bullish));
        assert_eq!(s.rsi_zone, Some(RsiZone::Neutral));

        let mut r = row();
        r.technical.last_close = None;
        r.technical.rsi = Some(25.0);
        r.technical.macd_signal = None;
        let s = technical_signals(&r);
        assert_eq!(s.vs_ma_50, None);
        assert_eq!(s.macd, None);
        assert_eq!(s.rsi_zone, Some(RsiZone::Oversold));
    }

    #[test]
    fn test_earnings_cadence() {
        let c = earnings_cadence(&row());
        assert_eq!(c.last_reported, Some(date(2025, 1, 30)));
        assert_eq!(c.predicted_gap_days, Some(84));
        assert!((c.mean_interval_days.unwrap() - 93.333_333).abs() < 1e-5);
    }

    #[test]
    fn test_symbol_detail() {
        let r = row();
        let d = symbol_detail(&r, date(2025, 4, 20));
        assert_eq!(d.days_until_earnings, Some(4));
        assert_eq!(d.comparisons.len(), 3);
    }
}
