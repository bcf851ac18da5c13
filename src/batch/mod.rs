//! Batch analysis of custom symbol lists.
//!
//! A workbook is a spreadsheet (`.xlsx`, `.xlsm`, `.xlsb`, `.xls`, `.ods`)
//! whose named sheets each hold a symbol list. A CSV file counts as a
//! one-sheet workbook named after its file stem, and a directory is read as
//! every workbook and CSV file inside it. Each sheet needs a `Symbol` column;
//! other columns are ignored.

use crate::analysis::OverviewStats;
use crate::models::NormalizedRow;
use crate::normalizer::cleaner::normalise_symbol;
use crate::normalizer::{RecordError, normalize_record};
use crate::snapshot::Snapshot;
use calamine::{Data, Range, Reader, open_workbook_auto};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const SYMBOL_COLUMN: &str = "Symbol";

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("could not read workbook {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not open spreadsheet {path:?}: {source}")]
    Spreadsheet {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    #[error("sheet `{sheet}` is not valid CSV: {source}")]
    Csv {
        sheet: String,
        #[source]
        source: csv::Error,
    },

    #[error("sheet `{sheet}` has no `Symbol` column (found: {})", .headers.join(", "))]
    MissingSymbolColumn { sheet: String, headers: Vec<String> },
}

// ── Sheets ────────────────────────────────────────────────────────────────────

/// Where one sheet's rows come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSource {
    Csv(PathBuf),
    Spreadsheet { path: PathBuf, sheet: String },
}

impl SheetSource {
    pub fn name(&self) -> String {
        match self {
            Self::Csv(path) => sheet_name(path),
            Self::Spreadsheet { sheet, .. } => sheet.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolSheet {
    pub name: String,
    /// Upper-cased, blanks removed, first occurrence kept.
    pub symbols: Vec<String>,
}

pub fn sheet_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("sheet")
        .to_string()
}

fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SPREADSHEET_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

fn is_csv(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}

/// Named sheets of one spreadsheet file, in workbook order.
fn spreadsheet_sheets(path: &Path) -> Result<Vec<SheetSource>, SheetError> {
    let workbook = open_workbook_auto(path).map_err(|source| SheetError::Spreadsheet {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(workbook
        .sheet_names()
        .into_iter()
        .map(|sheet| SheetSource::Spreadsheet {
            path: path.to_path_buf(),
            sheet,
        })
        .collect())
}

/// Sheets in the workbook. `Ok(None)` when the workbook does not exist,
/// which disables batch analysis.
///
/// A single file that is not a known spreadsheet format is read as CSV.
/// In a directory, files are taken in name order and a spreadsheet that
/// cannot be opened is skipped with a warning.
pub fn discover_sheets(workbook: &Path) -> Result<Option<Vec<SheetSource>>, SheetError> {
    if !workbook.exists() {
        debug!("No workbook at {:?}", workbook);
        return Ok(None);
    }
    if workbook.is_file() {
        if is_spreadsheet(workbook) {
            return spreadsheet_sheets(workbook).map(Some);
        }
        return Ok(Some(vec![SheetSource::Csv(workbook.to_path_buf())]));
    }

    let io_err = |source| SheetError::Io {
        path: workbook.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(workbook).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && (is_csv(&path) || is_spreadsheet(&path)) {
            files.push(path);
        }
    }
    files.sort();

    let mut sources = Vec::new();
    for path in files {
        if is_csv(&path) {
            sources.push(SheetSource::Csv(path));
            continue;
        }
        match spreadsheet_sheets(&path) {
            Ok(sheets) => sources.extend(sheets),
            Err(e) => warn!("Skipping {:?}: {}", path, e),
        }
    }
    Ok(Some(sources))
}

pub fn load_sheet(source: &SheetSource) -> Result<SymbolSheet, SheetError> {
    match source {
        SheetSource::Csv(path) => {
            let file = std::fs::File::open(path).map_err(|source| SheetError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            read_sheet(&sheet_name(path), file)
        }
        SheetSource::Spreadsheet { path, sheet } => {
            let spreadsheet_err = |source| SheetError::Spreadsheet {
                path: path.to_path_buf(),
                source,
            };
            let mut workbook = open_workbook_auto(path).map_err(spreadsheet_err)?;
            let range = workbook.worksheet_range(sheet).map_err(spreadsheet_err)?;
            read_range(sheet, &range)
        }
    }
}

/// Symbols from a CSV sheet with a header row.
pub fn read_sheet<R: Read>(name: &str, source: R) -> Result<SymbolSheet, SheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|source| SheetError::Csv {
            sheet: name.to_string(),
            source,
        })?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let rows = reader
        .into_records()
        .enumerate()
        .filter_map(|(i, result)| match result {
            Ok(record) => Some(record.iter().map(str::to_string).collect::<Vec<String>>()),
            Err(e) => {
                warn!("Sheet {} row {}: {}", name, i + 1, e);
                None
            }
        });

    collect_symbols(name, headers, rows)
}

/// Symbols from a spreadsheet range whose first used row is the header.
pub fn read_range(name: &str, range: &Range<Data>) -> Result<SymbolSheet, SheetError> {
    let mut rows = range
        .rows()
        .map(|cells| cells.iter().map(cell_text).collect::<Vec<String>>());
    let headers = rows.next().unwrap_or_default();
    collect_symbols(name, headers, rows)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        other => other.to_string().trim().to_string(),
    }
}

fn collect_symbols(
    name: &str,
    headers: Vec<String>,
    rows: impl Iterator<Item = Vec<String>>,
) -> Result<SymbolSheet, SheetError> {
    let Some(col) = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(SYMBOL_COLUMN))
    else {
        return Err(SheetError::MissingSymbolColumn {
            sheet: name.to_string(),
            headers,
        });
    };

    let mut seen = HashSet::new();
    let mut symbols = Vec::new();
    for row in rows {
        let Some(cell) = row.get(col) else { continue };
        let symbol = normalise_symbol(cell);
        if !symbol.is_empty() && seen.insert(symbol.clone()) {
            symbols.push(symbol);
        }
    }

    info!("Sheet {}: {} symbols", name, symbols.len());
    Ok(SymbolSheet {
        name: name.to_string(),
        symbols,
    })
}

// ── Analysis ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }

    /// True each time another tenth of the list is done, and at the end.
    pub fn is_checkpoint(&self) -> bool {
        if self.processed == 0 {
            return self.total == 0;
        }
        if self.processed >= self.total {
            return true;
        }
        self.processed * 10 / self.total > (self.processed - 1) * 10 / self.total
    }
}

#[derive(Debug)]
pub struct BatchReport {
    pub rows: Vec<NormalizedRow>,
    /// Listed symbols absent from the snapshot.
    pub missing: Vec<String>,
    /// Snapshot keys of listed symbols whose record could not be read.
    pub invalid: Vec<(String, RecordError)>,
    pub stats: OverviewStats,
}

impl BatchReport {
    pub fn skipped(&self) -> usize {
        self.missing.len() + self.invalid.len()
    }
}

/// Normalize each listed symbol against the loaded snapshot, reporting
/// progress after every symbol.
pub fn analyze_symbols(
    snapshot: &Snapshot,
    symbols: &[String],
    today: NaiveDate,
    mut progress: impl FnMut(Progress),
) -> BatchReport {
    let total = symbols.len();
    let mut rows = Vec::new();
    let mut missing = Vec::new();
    let mut invalid = Vec::new();

    for (i, symbol) in symbols.iter().enumerate() {
        match snapshot.get(symbol) {
            None => {
                debug!("{}: not in snapshot", symbol);
                missing.push(symbol.clone());
            }
            Some((key, record)) => match normalize_record(key, record) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    warn!("Skipping {}: {}", key, e);
                    invalid.push((key.to_string(), e));
                }
            },
        }
        progress(Progress {
            processed: i + 1,
            total,
        });
    }

    if total == 0 {
        progress(Progress {
            processed: 0,
            total: 0,
        });
    }

    info!(
        "Batch: {} analyzed, {} not in snapshot, {} unreadable",
        rows.len(),
        missing.len(),
        invalid.len()
    );

    let stats = OverviewStats::compute(&rows, today);
    BatchReport {
        rows,
        missing,
        invalid,
        stats,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::complete_record;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 28).unwrap()
    }

    fn snapshot() -> Snapshot {
        Snapshot::from_value(json!({
            "AAA": complete_record(),
            "BAD": {"technical": [], "earnings": {}}
        }))
        .unwrap()
    }

    fn text(s: &str) -> Data {
        Data::String(s.to_string())
    }

    #[test]
    fn test_batch_skips_absent_symbols() {
        let mut seen = Vec::new();
        let report = analyze_symbols(
            &snapshot(),
            &["AAA".to_string(), "ZZZ".to_string()],
            today(),
            |p| seen.push(p),
        );

        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].symbol, "AAA");
        assert_eq!(report.missing, vec!["ZZZ"]);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.stats.rows, 1);

        let fractions: Vec<f64> = seen.iter().map(Progress::fraction).collect();
        assert_eq!(fractions, vec![0.5, 1.0]);
    }

    #[test]
    fn test_batch_rows_use_snapshot_keys() {
        let snap = Snapshot::from_value(json!({"brk.b": complete_record()})).unwrap();
        let report = analyze_symbols(&snap, &["BRK.B".to_string()], today(), |_| {});
        assert_eq!(report.rows[0].symbol, "brk.b");
    }

    #[test]
    fn test_batch_reports_unreadable_records() {
        let report = analyze_symbols(&snapshot(), &["BAD".to_string()], today(), |_| {});
        assert!(report.rows.is_empty());
        assert!(report.missing.is_empty());
        assert_eq!(report.invalid.len(), 1);
        assert_eq!(report.invalid[0].0, "BAD");
    }

    #[test]
    fn test_empty_list_reports_complete() {
        let mut last = None;
        let report = analyze_symbols(&snapshot(), &[], today(), |p| last = Some(p));
        assert!(report.rows.is_empty());
        assert_eq!(last.map(|p| p.fraction()), Some(1.0));
        assert_eq!(last.map(|p| p.is_checkpoint()), Some(true));
    }

    #[test]
    fn test_progress_checkpoints_every_tenth() {
        let hits: Vec<usize> = (1..=20)
            .map(|processed| Progress { processed, total: 20 })
            .filter(Progress::is_checkpoint)
            .map(|p| p.processed)
            .collect();
        assert_eq!(hits, vec![2, 4, 6, 8, 10, 12, 14, 16, 18, 20]);

        let short: Vec<bool> = (1..=3)
            .map(|processed| Progress { processed, total: 3 }.is_checkpoint())
            .collect();
        assert_eq!(short, vec![true, true, true]);
    }

    #[test]
    fn test_read_sheet_normalises_symbols() {
        let csv = "Name,symbol,Weight\n\
                   Apple, aapl ,0.5\n\
                   Blank,,0.1\n\
                   Apple again,AAPL,0.2\n\
                   Microsoft,MSFT,0.3\n";
        let sheet = read_sheet("tech", csv.as_bytes()).unwrap();
        assert_eq!(sheet.name, "tech");
        assert_eq!(sheet.symbols, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_read_sheet_without_symbol_column() {
        let csv = "Ticker,Weight\nAAPL,1\n";
        match read_sheet("bad", csv.as_bytes()) {
            Err(SheetError::MissingSymbolColumn { sheet, headers }) => {
                assert_eq!(sheet, "bad");
                assert_eq!(headers, vec!["Ticker", "Weight"]);
            }
            other => panic!("expected MissingSymbolColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_read_range_from_spreadsheet() {
        let mut range = Range::new((0, 0), (4, 1));
        range.set_value((0, 0), text("Company"));
        range.set_value((0, 1), text(" SYMBOL "));
        range.set_value((1, 0), text("Apple"));
        range.set_value((1, 1), text("aapl"));
        range.set_value((2, 0), text("Empty row"));
        range.set_value((3, 0), text("Microsoft"));
        range.set_value((3, 1), text("MSFT"));
        range.set_value((4, 0), text("Apple again"));
        range.set_value((4, 1), text("AAPL"));

        let sheet = read_range("Tech", &range).unwrap();
        assert_eq!(sheet.name, "Tech");
        assert_eq!(sheet.symbols, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_read_range_without_symbol_column() {
        let mut range = Range::new((0, 0), (1, 0));
        range.set_value((0, 0), text("Ticker"));
        range.set_value((1, 0), text("AAPL"));
        assert!(matches!(
            read_range("Bad", &range),
            Err(SheetError::MissingSymbolColumn { .. })
        ));

        let empty: Range<Data> = Range::empty();
        assert!(matches!(
            read_range("Empty", &empty),
            Err(SheetError::MissingSymbolColumn { .. })
        ));
    }

    #[test]
    fn test_discover_sheets() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_sheets(&dir.path().join("absent")).unwrap().is_none());

        std::fs::write(dir.path().join("watchlist.csv"), "Symbol\nAAA\n").unwrap();
        std::fs::write(dir.path().join("banks.CSV"), "Symbol\nJPM\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();
        std::fs::write(dir.path().join("corrupt.xlsx"), "not a zip archive").unwrap();

        let sheets = discover_sheets(dir.path()).unwrap().unwrap();
        let names: Vec<String> = sheets.iter().map(SheetSource::name).collect();
        assert_eq!(names, vec!["banks", "watchlist"]);

        let single = discover_sheets(&dir.path().join("watchlist.csv"))
            .unwrap()
            .unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(load_sheet(&single[0]).unwrap().symbols, vec!["AAA"]);
    }

    #[test]
    fn test_unreadable_spreadsheet_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lists.xlsx");
        std::fs::write(&path, "not a zip archive").unwrap();

        assert!(matches!(
            discover_sheets(&path),
            Err(SheetError::Spreadsheet { .. })
        ));
        let source = SheetSource::Spreadsheet {
            path,
            sheet: "Sheet1".into(),
        };
        assert!(matches!(
            load_sheet(&source),
            Err(SheetError::Spreadsheet { .. })
        ));
    }
}
