//! Read-only snapshot of per-symbol analytics, loaded once per run.

use crate::normalizer::cleaner::normalise_symbol;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("could not read snapshot {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot {path:?} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot root must be an object keyed by symbol, found {found}")]
    NotAnObject { found: &'static str },
}

/// The parsed snapshot document: symbol → raw record, in file order.
#[derive(Debug, Clone)]
pub struct Snapshot {
    source: Option<PathBuf>,
    records: Map<String, Value>,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let text = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|source| SnapshotError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        let mut snapshot = Self::from_value(value)?;
        snapshot.source = Some(path.to_path_buf());
        info!("Loaded snapshot {:?}: {} symbols", path, snapshot.len());
        Ok(snapshot)
    }

    pub fn from_value(value: Value) -> Result<Self, SnapshotError> {
        match value {
            Value::Object(records) => Ok(Self { source: None, records }),
            other => Err(SnapshotError::NotAnObject { found: json_kind(&other) }),
        }
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Raw records in file order.
    pub fn records(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Record for `symbol`, matched exactly first and then case-insensitively.
    pub fn get(&self, symbol: &str) -> Option<(&str, &Value)> {
        let wanted = normalise_symbol(symbol);
        self.records
            .iter()
            .find(|(k, _)| k.as_str() == symbol)
            .or_else(|| self.records.iter().find(|(k, _)| normalise_symbol(k) == wanted))
            .map(|(k, v)| (k.as_str(), v))
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Cache ─────────────────────────────────────────────────────────────────────

/// Keeps each loaded snapshot by path; the file is immutable for the run so
/// entries are never invalidated.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: HashMap<PathBuf, Arc<Snapshot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, path: &Path) -> Result<Arc<Snapshot>, SnapshotError> {
        let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        if let Some(hit) = self.entries.get(&key) {
            debug!("Snapshot cache hit for {:?}", key);
            return Ok(Arc::clone(hit));
        }

        let snapshot = Arc::new(Snapshot::load(path)?);
        self.entries.insert(key, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_snapshot(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("snapshot.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_from_value_keeps_file_order() {
        let snap = Snapshot::from_value(json!({"ZZZ": {}, "AAA": {}, "MMM": {}})).unwrap();
        let keys: Vec<&str> = snap.records().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["ZZZ", "AAA", "MMM"]);
    }

    #[test]
    fn test_root_must_be_object() {
        let err = Snapshot::from_value(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, SnapshotError::NotAnObject { found: "array" }));
    }

    #[test]
    fn test_get_falls_back_to_case_insensitive() {
        let snap = Snapshot::from_value(json!({"aapl": {"status": "ok"}})).unwrap();
        assert_eq!(snap.get("AAPL").map(|(k, _)| k), Some("aapl"));
        assert!(snap.get("MSFT").is_none());
    }

    #[test]
    fn test_load_reports_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_snapshot(dir.path(), "{not json");
        assert!(matches!(Snapshot::load(&path), Err(SnapshotError::Json { .. })));
        assert!(matches!(
            Snapshot::load(&dir.path().join("absent.json")),
            Err(SnapshotError::Io { .. })
        ));
    }

    #[test]
    fn test_cache_does_not_reparse() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_snapshot(dir.path(), r#"{"AAA": {"status": "ok"}}"#);

        let mut cache = SnapshotCache::new();
        let first = cache.load(&path).unwrap();

        // Corrupt the file: a second load must come from the cache.
        write_snapshot(dir.path(), "garbage");
        let second = cache.load(&path).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!(second.source(), Some(path.as_path()));
    }
}
