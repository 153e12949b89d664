use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Highest explicit worker count accepted for a backup run.
pub const MAX_CONCURRENCY: u32 = 32;

/// Zip deflate level used when the settings file does not specify one.
pub const DEFAULT_COMPRESSION_LEVEL: i64 = 9;

pub const STATUS_OK: &str = "OK";
pub const STATUS_INVALID_PENUMBRA: &str = "Invalid Penumbra path";
pub const STATUS_NO_SORT_ORDER: &str = "sort_order.json not found in Penumbra path";
pub const STATUS_NO_COLLECTIONS: &str = "collections folder not found in Penumbra path";
pub const STATUS_INVALID_MODS: &str = "Invalid Mods path";
pub const STATUS_NO_MODS: &str = "No mods from Penumbra found in Mods folder";

/// A single configured directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathConfig {
    #[serde(default)]
    pub path: Utf8PathBuf,
}

impl PathConfig {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// User settings persisted in `aurora.yaml`.
///
/// Every field has a default so that partial files (or a file written by an
/// older version) still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuroraConfig {
    /// Penumbra plugin configuration directory (holds `sort_order.json`)
    #[serde(default)]
    pub penumbra: PathConfig,

    /// Directory holding one sub-directory per mod
    #[serde(default)]
    pub mods: PathConfig,

    /// Ordered exclusion patterns; the first match wins
    #[serde(default)]
    pub filters: Vec<String>,

    /// Backup worker count, 0 = all available cores
    #[serde(default)]
    pub concurrency: u32,

    /// Directory the archives are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: Utf8PathBuf,

    /// Archive base name, without extension
    #[serde(default = "default_archive_name")]
    pub archive_name: String,

    #[serde(default = "default_compression_level")]
    pub compression_level: i64,
}

impl Default for AuroraConfig {
    fn default() -> Self {
        Self {
            penumbra: PathConfig::default(),
            mods: PathConfig::default(),
            filters: Vec::new(),
            concurrency: 0,
            output_dir: default_output_dir(),
            archive_name: default_archive_name(),
            compression_level: default_compression_level(),
        }
    }
}

fn default_output_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(".")
}

fn default_archive_name() -> String {
    "backup".to_string()
}

fn default_compression_level() -> i64 {
    DEFAULT_COMPRESSION_LEVEL
}

impl AuroraConfig {
    /// Check whether a filter is already configured (exact match).
    pub fn has_filter(&self, filter: &str) -> bool {
        self.filters.iter().any(|f| f == filter)
    }
}

/// Validity of the configured paths.
///
/// An invalid configuration is reported through this value rather than as an
/// error so callers can still render in a degraded state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigStatus {
    pub valid: bool,
    pub penumbra_status: String,
    pub mods_status: String,
}

impl ConfigStatus {
    pub fn new(penumbra_status: impl Into<String>, mods_status: impl Into<String>) -> Self {
        let penumbra_status = penumbra_status.into();
        let mods_status = mods_status.into();
        Self {
            valid: penumbra_status == STATUS_OK && mods_status == STATUS_OK,
            penumbra_status,
            mods_status,
        }
    }
}

impl Default for ConfigStatus {
    fn default() -> Self {
        Self::new(STATUS_INVALID_PENUMBRA, STATUS_INVALID_MODS)
    }
}

/// Snapshot returned by the GetConfig operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResult {
    pub penumbra_path: Utf8PathBuf,
    pub mods_path: Utf8PathBuf,
    pub filters: Vec<String>,
    pub concurrency: u32,
    pub status: ConfigStatus,
}

impl ConfigResult {
    pub fn new(config: &AuroraConfig, status: ConfigStatus) -> Self {
        Self {
            penumbra_path: config.penumbra.path.clone(),
            mods_path: config.mods.path.clone(),
            filters: config.filters.clone(),
            concurrency: config.concurrency,
            status,
        }
    }
}
