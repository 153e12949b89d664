use super::inventory::Mod;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Share of the original size a backup is expected to take once compressed.
///
/// This is a static heuristic, not a measured ratio.
pub const ESTIMATED_COMPRESSION_RATIO: f64 = 0.25;

/// Safety margin required on top of the estimated archive size.
pub const DISK_SPACE_MARGIN: f64 = 1.05;

/// Planning-time inclusion decision for a single mod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupItem {
    #[serde(rename = "mod")]
    pub mod_entry: Mod,

    /// Filter that excluded this mod, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered_by: Option<String>,

    pub is_filtered: bool,
}

impl BackupItem {
    pub fn included(mod_entry: Mod) -> Self {
        Self {
            mod_entry,
            filtered_by: None,
            is_filtered: false,
        }
    }

    pub fn excluded(mod_entry: Mod, filter: impl Into<String>) -> Self {
        Self {
            mod_entry,
            filtered_by: Some(filter.into()),
            is_filtered: true,
        }
    }
}

/// Free space on the volume receiving the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceCheck {
    pub available: u64,
    pub required: u64,
    pub has_enough_space: bool,
}

/// Complete backup plan computed from one inventory + filter snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupValidation {
    /// One entry per used mod, in inventory order
    pub items: Vec<BackupItem>,

    /// Size of every used mod, filtered or not
    pub total_size: u64,
    pub total_size_human: String,

    /// Compressed-size estimate for the mods that will be archived
    pub estimated_size: u64,
    pub estimated_size_human: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<SpaceCheck>,
}

impl BackupValidation {
    /// Items that will go into the archive.
    pub fn included(&self) -> impl Iterator<Item = &BackupItem> {
        self.items.iter().filter(|item| !item.is_filtered)
    }

    pub fn included_count(&self) -> usize {
        self.included().count()
    }

    /// Sum of the sizes of the items that will be archived.
    pub fn included_size(&self) -> u64 {
        self.included().map(|item| item.mod_entry.size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.included_count() == 0
    }
}

/// Discrete status update emitted while a backup runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupProgress {
    /// 0-100, never decreasing within one run
    pub percent: f64,

    /// Label of the unit of work most recently started or finished
    pub current: String,

    /// True only on the terminal event
    pub done: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackupProgress {
    pub fn is_failure(&self) -> bool {
        self.done && self.error.is_some()
    }
}

/// Outcome of one successful backup run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupResult {
    /// Archive file name, or `"<first> ... <last>"` when split into parts
    pub output_path: String,

    /// Every archive written by the run
    pub parts: Vec<Utf8PathBuf>,

    /// Bytes read from the mod directories
    pub original_size: u64,

    /// Bytes written to the archives
    pub compressed_size: u64,

    /// `compressed_size / original_size`, e.g. `"23.4%"`
    pub ratio: String,

    pub mods_archived: usize,
}

/// Format the compression ratio as a percentage with one decimal place.
pub fn format_ratio(compressed: u64, original: u64) -> String {
    if original == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", compressed as f64 / original as f64 * 100.0)
}
