//! Plain-text views for the terminal. Each view implements `Display`, so the
//! CLI decides where the text goes.

use crate::analysis::{OverviewStats, PricePosition, SymbolDetail, days_until};
use crate::batch::BatchReport;
use crate::config::DisplayConfig;
use crate::models::NormalizedRow;
use crate::normalizer::RecordError;
use crate::utils::{NO_VALUE, fmt_number, fmt_opt, fmt_opt_compact, fmt_pct, fmt_volume};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

const RULE: &str = "─────────────────────────────────────────────────────────────";
const BAR_WIDTH: usize = 30;

fn opt_text(v: Option<&str>) -> &str {
    v.unwrap_or(NO_VALUE)
}

fn opt_date(d: Option<NaiveDate>) -> String {
    d.map(|d| d.to_string())
        .unwrap_or_else(|| NO_VALUE.to_string())
}

fn opt_int(v: Option<i64>) -> String {
    v.map(|d| d.to_string())
        .unwrap_or_else(|| NO_VALUE.to_string())
}

// ── Overview table ────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
}

const COLUMNS: [(&str, usize, Align); 14] = [
    ("Symbol", 8, Align::Left),
    ("Status", 8, Align::Left),
    ("Earnings", 10, Align::Left),
    ("Days", 5, Align::Right),
    ("Conf", 4, Align::Right),
    ("Close", 10, Align::Right),
    ("RSI", 5, Align::Right),
    ("Trend", 14, Align::Left),
    ("MA20", 10, Align::Right),
    ("MA50", 10, Align::Right),
    ("MA200", 10, Align::Right),
    ("Rev(P)", 9, Align::Right),
    ("NI(P)", 9, Align::Right),
    ("EPS(P)", 7, Align::Right),
];

fn write_cells<S: AsRef<str>>(f: &mut Formatter<'_>, cells: &[S]) -> fmt::Result {
    for (i, ((_, width, align), cell)) in COLUMNS.iter().zip(cells).enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        match align {
            Align::Left => write!(f, "{:<w$}", cell.as_ref(), w = width)?,
            Align::Right => write!(f, "{:>w$}", cell.as_ref(), w = width)?,
        }
    }
    writeln!(f)
}

/// Overview table; rows carrying an upstream error are listed under it.
pub struct TableView<'a> {
    pub rows: &'a [&'a NormalizedRow],
    pub today: NaiveDate,
    pub display: &'a DisplayConfig,
}

impl Display for TableView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let dp = self.display.decimals;
        let headers: Vec<&str> = COLUMNS.iter().map(|(name, _, _)| *name).collect();
        write_cells(f, &headers)?;

        let limit = match self.display.max_rows {
            0 => self.rows.len(),
            n => n,
        };
        let shown = &self.rows[..self.rows.len().min(limit)];

        for row in shown {
            let t = &row.technical;
            let days = days_until(row.earnings.next_earnings, self.today);
            let cells = [
                row.symbol.clone(),
                opt_text(row.status.as_deref()).to_string(),
                opt_date(row.earnings.next_earnings),
                opt_int(days),
                fmt_opt(row.earnings.confidence_score, 0),
                fmt_opt(t.last_close, dp),
                fmt_opt(t.rsi, 1),
                opt_text(t.trend.as_deref()).to_string(),
                fmt_opt(t.ma_20, dp),
                fmt_opt(t.ma_50, dp),
                fmt_opt(t.ma_200, dp),
                fmt_opt_compact(row.predicted_revenue(), dp),
                fmt_opt_compact(row.predicted_net_income(), dp),
                fmt_opt(row.predicted_eps(), dp),
            ];
            write_cells(f, &cells)?;
        }

        if self.rows.len() > shown.len() {
            writeln!(
                f,
                "… {} more rows (raise display.max_rows)",
                self.rows.len() - shown.len()
            )?;
        }

        for row in shown {
            if let Some(err) = &row.error {
                writeln!(f, "  ! {}: {}", row.symbol, err)?;
            }
        }
        Ok(())
    }
}

// ── Aggregates ────────────────────────────────────────────────────────────────

fn bar(count: usize, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    "█".repeat((count * BAR_WIDTH).div_ceil(max))
}

fn write_distribution<K: Display>(
    f: &mut Formatter<'_>,
    title: &str,
    counts: &BTreeMap<K, usize>,
) -> fmt::Result {
    writeln!(f, "  {}:", title)?;
    if counts.is_empty() {
        return writeln!(f, "    {}", NO_VALUE);
    }
    let max = counts.values().copied().max().unwrap_or(0);
    for (k, n) in counts {
        writeln!(f, "    {:<16} {:>4} {}", k.to_string(), n, bar(*n, max))?;
    }
    Ok(())
}

pub struct StatsView<'a> {
    pub stats: &'a OverviewStats,
    pub decimals: usize,
}

impl Display for StatsView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = self.stats;
        writeln!(f, "{}", RULE)?;
        writeln!(f, "  Stocks shown           : {}", fmt_number(s.rows as i64))?;
        writeln!(f, "  Avg confidence score   : {}", fmt_opt(s.avg_confidence, 1))?;
        writeln!(f, "  Most common confidence : {}", opt_int(s.confidence_mode))?;
        writeln!(f, "  Avg RSI                : {}", fmt_opt(s.avg_rsi, 1))?;
        writeln!(
            f,
            "  Avg days to earnings   : {}",
            fmt_opt(s.avg_days_until_earnings, self.decimals)
        )?;
        writeln!(f, "  Bullish trend          : {}", s.bullish)?;
        writeln!(f, "{}", RULE)?;
        write_distribution(f, "Trend distribution", &s.trend_distribution)?;
        write_distribution(f, "Earnings date distribution", &s.earnings_by_date)
    }
}

// ── Drill-down ────────────────────────────────────────────────────────────────

fn position_note(p: Option<PricePosition>) -> String {
    p.map(|p| format!("(price {})", p)).unwrap_or_default()
}

fn paren<T: Display>(v: Option<T>) -> String {
    v.map(|v| format!("({})", v)).unwrap_or_default()
}

pub struct DetailView<'a> {
    pub detail: &'a SymbolDetail<'a>,
    pub decimals: usize,
}

impl DetailView<'_> {
    fn write_technical(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let t = &self.detail.row.technical;
        let s = &self.detail.signals;
        let dp = self.decimals;

        writeln!(f, "  Technical")?;
        writeln!(f, "    Last close  : {}", fmt_opt(t.last_close, dp))?;
        writeln!(f, "    Last volume : {}", fmt_volume(t.last_volume))?;
        writeln!(f, "    RSI         : {} {}", fmt_opt(t.rsi, 1), paren(s.rsi_zone))?;
        writeln!(f, "    Trend       : {}", opt_text(t.trend.as_deref()))?;
        for (label, ma, pos) in [
            ("MA 20 ", t.ma_20, s.vs_ma_20),
            ("MA 50 ", t.ma_50, s.vs_ma_50),
            ("MA 200", t.ma_200, s.vs_ma_200),
        ] {
            writeln!(f, "    {}      : {} {}", label, fmt_opt(ma, dp), position_note(pos))?;
        }
        writeln!(
            f,
            "    MACD        : {} / signal {} {}",
            fmt_opt(t.macd_line, 3),
            fmt_opt(t.macd_signal, 3),
            paren(s.macd)
        )
    }

    fn write_earnings(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let e = &self.detail.row.earnings;
        let c = &self.detail.cadence;

        writeln!(f, "  Earnings")?;
        writeln!(
            f,
            "    Next (predicted) : {} ({} days)",
            opt_date(e.next_earnings),
            opt_int(self.detail.days_until_earnings)
        )?;
        writeln!(f, "    Confidence       : {}", fmt_opt(e.confidence_score, 0))?;
        writeln!(f, "    Last reported    : {}", opt_date(c.last_reported))?;
        writeln!(f, "    Avg interval     : {} days", fmt_opt(c.mean_interval_days, 1))?;
        writeln!(f, "    Predicted gap    : {} days", opt_int(c.predicted_gap_days))?;

        let history: Vec<String> = e.historical_dates.iter().map(|d| d.to_string()).collect();
        if history.is_empty() {
            writeln!(f, "    History          : {}", NO_VALUE)
        } else {
            writeln!(f, "    History          : {}", history.join(", "))
        }
    }

    fn write_fundamentals(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let dp = self.decimals;

        writeln!(f, "  Fundamentals")?;
        if self.detail.comparisons.is_empty() {
            return writeln!(f, "    {}", NO_VALUE);
        }
        writeln!(
            f,
            "    {:<28} {:<11} {:>12} {:>12} {:>12} {:>10}",
            "Metric", "As of", "Last", "Δ prev", "Predicted", "Change"
        )?;
        for m in &self.detail.comparisons {
            writeln!(
                f,
                "    {:<28} {:<11} {:>12} {:>12} {:>12} {:>10}",
                m.metric,
                opt_date(m.last_date),
                fmt_opt_compact(m.last_historical, dp),
                fmt_opt_compact(m.last_delta, dp),
                fmt_opt_compact(m.predicted, dp),
                fmt_pct(m.change_pct, dp)
            )?;
        }
        Ok(())
    }
}

impl Display for DetailView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let row = self.detail.row;

        writeln!(f, "{}", RULE)?;
        writeln!(f, "  {}  status: {}", row.symbol, opt_text(row.status.as_deref()))?;
        if let Some(err) = &row.error {
            writeln!(f, "  upstream error: {}", err)?;
        }
        writeln!(f, "{}", RULE)?;

        self.write_technical(f)?;
        self.write_earnings(f)?;
        self.write_fundamentals(f)
    }
}

// ── Batch ─────────────────────────────────────────────────────────────────────

/// One line per skipped record, with the upstream error when there was one.
pub struct SkippedView<'a>(pub &'a [(String, RecordError)]);

impl Display for SkippedView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (symbol, err) in self.0 {
            write!(f, "  skipped {}: {}", symbol, err)?;
            if let RecordError::MissingSection {
                upstream_error: Some(upstream),
                ..
            } = err
            {
                write!(f, " (upstream: {})", upstream)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

pub struct BatchView<'a> {
    pub sheet: &'a str,
    pub report: &'a BatchReport,
    pub today: NaiveDate,
    pub display: &'a DisplayConfig,
}

impl Display for BatchView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let report = self.report;

        writeln!(f, "{}", RULE)?;
        writeln!(
            f,
            "  Sheet `{}`: {} analyzed, {} skipped",
            self.sheet,
            report.rows.len(),
            report.skipped()
        )?;
        if !report.missing.is_empty() {
            writeln!(f, "  Not in snapshot: {}", report.missing.join(", "))?;
        }
        write!(f, "{}", SkippedView(&report.invalid))?;
        writeln!(f, "{}", RULE)?;

        if report.rows.is_empty() {
            return Ok(());
        }
        let rows: Vec<&NormalizedRow> = report.rows.iter().collect();
        let table = TableView {
            rows: &rows,
            today: self.today,
            display: self.display,
        };
        let stats = StatsView {
            stats: &report.stats,
            decimals: self.display.decimals,
        };
        write!(f, "{}{}", table, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::symbol_detail;
    use crate::batch::analyze_symbols;
    use crate::models::fixtures::complete_record;
    use crate::normalizer::normalize_record;
    use crate::snapshot::Snapshot;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 28).unwrap()
    }

    fn row(symbol: &str) -> NormalizedRow {
        normalize_record(symbol, &complete_record()).unwrap()
    }

    fn table(rows: &[&NormalizedRow], display: &DisplayConfig) -> String {
        TableView {
            rows,
            today: today(),
            display,
        }
        .to_string()
    }

    #[test]
    fn test_table_truncates_to_max_rows() {
        let rows = [row("AAA"), row("BBB"), row("CCC")];
        let refs: Vec<&NormalizedRow> = rows.iter().collect();
        let display = DisplayConfig {
            max_rows: 2,
            decimals: 2,
        };

        let text = table(&refs, &display);
        assert!(text.contains("AAA"));
        assert!(text.contains("BBB"));
        assert!(!text.contains("CCC"));
        assert!(text.contains("1 more rows"));
        assert!(text.contains("402.00B"));
    }

    #[test]
    fn test_table_shows_status_and_upstream_error() {
        let mut r = row("AAA");
        r.technical.rsi = None;
        r.error = Some("fundamentals fetch timed out".into());

        let text = table(&[&r], &DisplayConfig::default());
        assert!(text.contains("Status"));
        assert!(text.contains(" ok "));
        assert!(text.contains(NO_VALUE));
        assert!(text.contains("! AAA: fundamentals fetch timed out"));
    }

    #[test]
    fn test_detail_mentions_signals_and_comparisons() {
        let r = row("AAPL");
        let detail = symbol_detail(&r, today());
        let text = DetailView {
            detail: &detail,
            decimals: 2,
        }
        .to_string();
        assert!(text.contains("AAPL"));
        assert!(text.contains("(price above)"));
        assert!(text.contains("(bullish)"));
        assert!(text.contains("Basic EPS"));
        assert!(text.contains("+6.38%"));
        assert!(text.contains("(27 days)"));
        assert!(text.contains("51,234,000"));
    }

    #[test]
    fn test_detail_with_extreme_volume() {
        let mut r = row("AAPL");
        r.technical.last_volume = Some(-1e19);
        let detail = symbol_detail(&r, today());
        let text = DetailView {
            detail: &detail,
            decimals: 2,
        }
        .to_string();
        assert!(text.contains("Last volume : -10000000.00T"));
    }

    #[test]
    fn test_stats_lists_distributions() {
        let rows = [row("AAA"), row("BBB")];
        let stats = OverviewStats::compute(&rows, today());
        let text = StatsView {
            stats: &stats,
            decimals: 2,
        }
        .to_string();
        assert!(text.contains("Bullish"));
        assert!(text.contains("2025-04-24"));
        assert!(text.contains("Bullish trend          : 2"));
    }

    #[test]
    fn test_skipped_view_includes_upstream_error() {
        let skipped = vec![(
            "XYZ".to_string(),
            RecordError::MissingSection {
                section: "technical",
                upstream_error: Some("No price history".into()),
            },
        )];
        let text = SkippedView(&skipped).to_string();
        assert_eq!(
            text,
            "  skipped XYZ: section `technical` is missing (upstream: No price history)\n"
        );
    }

    #[test]
    fn test_batch_view_lists_missing_symbols() {
        let snap = Snapshot::from_value(json!({"AAA": complete_record()})).unwrap();
        let symbols = ["AAA".to_string(), "ZZZ".to_string()];
        let report = analyze_symbols(&snap, &symbols, today(), |_| {});
        let display = DisplayConfig::default();

        let text = BatchView {
            sheet: "watchlist",
            report: &report,
            today: today(),
            display: &display,
        }
        .to_string();
        assert!(text.contains("Sheet `watchlist`: 1 analyzed, 1 skipped"));
        assert!(text.contains("Not in snapshot: ZZZ"));
        assert!(text.contains("Stocks shown           : 1"));
    }

    #[test]
    fn test_bar_scales_to_max() {
        assert_eq!(bar(0, 0), "");
        assert_eq!(bar(10, 10).chars().count(), BAR_WIDTH);
        assert_eq!(bar(1, 10).chars().count(), 3);
    }
}
