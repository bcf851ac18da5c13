use crate::filter::{Filter, FilterParseError};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Snapshot source
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_path")]
    pub path: PathBuf,
}

/// Custom symbol lists for batch analysis
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    #[serde(default = "default_workbook")]
    pub workbook: PathBuf,
}

/// Filters applied before any given on the command line
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub default: Vec<String>,
}

/// Terminal output
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisplayConfig {
    /// 0 = no limit
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    #[serde(default = "default_decimals")]
    pub decimals: usize,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("data/snapshot.json")
}
fn default_workbook() -> PathBuf {
    PathBuf::from("data/lists")
}
fn default_max_rows() -> usize {
    50
}
fn default_decimals() -> usize {
    2
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { path: default_snapshot_path() }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { workbook: default_workbook() }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            decimals: default_decimals(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from `config/` + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::load_from(Path::new("config"))
    }

    /// `<dir>/default.toml`, then `<dir>/local.toml`, then `STOCKSNAP_*` env.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name(&dir.join("default").to_string_lossy())
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name(&dir.join("local").to_string_lossy())
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("STOCKSNAP").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {:?}", dir))?;

        cfg.try_deserialize().context("Invalid configuration")
    }

    pub fn default_filters(&self) -> Result<Vec<Filter>, FilterParseError> {
        self.filters.default.iter().map(|f| f.parse()).collect()
    }
}
