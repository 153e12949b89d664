//! Penumbra scan source.
//!
//! Reads the Penumbra plugin configuration (`sort_order.json` and the
//! `collections` folder) together with the mods directory and produces the
//! raw mod and collection lists consumed by the inventory builder.
//!
//! # Files
//!
//! - `sort_order.json`: `{"Data": {"<key>": "<folder>/<Mod Name>"}}`. The mod
//!   name is the last segment of each value.
//! - `collections/*.json`: `{"Name": "...", "Settings": {"<Mod Name>": {"Enabled": true}}}`.
//!
//! Both files may be saved with a UTF-8 byte order mark.

use crate::models::AuroraConfig;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fs;
use thiserror::Error;
use walkdir::WalkDir;

pub const SORT_ORDER_FILE: &str = "sort_order.json";
pub const COLLECTIONS_FOLDER: &str = "collections";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Errors that can occur while scanning Penumbra data
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to read {path}: {source}")]
    SortOrderUnreadable {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed {path}: {source}")]
    MalformedSortOrder {
        path: Utf8PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to read collections folder {path}: {source}")]
    CollectionsUnreadable {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed collection file {path}: {source}")]
    MalformedCollection {
        path: Utf8PathBuf,
        source: serde_json::Error,
    },
}

/// A mod as reported by the scan source, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMod {
    pub name: String,
    pub path: Utf8PathBuf,
    pub size: u64,
}

/// A collection as reported by the scan source: its name and the names of
/// the mods it enables, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCollection {
    pub name: String,
    pub mods: Vec<String>,
}

/// Everything one scan produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawScan {
    pub mods: Vec<RawMod>,
    pub collections: Vec<RawCollection>,
}

/// Source of raw mod and collection data.
///
/// The application talks to Penumbra only through this trait, which keeps the
/// facade testable without a Penumbra install.
#[cfg_attr(test, mockall::automock)]
pub trait ModSource: Send + Sync {
    fn scan(&self, config: &AuroraConfig) -> Result<RawScan, ScanError>;
}

/// [`ModSource`] reading a Penumbra install from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct PenumbraSource;

impl ModSource for PenumbraSource {
    fn scan(&self, config: &AuroraConfig) -> Result<RawScan, ScanError> {
        let mods = load_mods(&config.penumbra.path, &config.mods.path)?;
        let collections = load_collections(&config.penumbra.path)?;

        tracing::info!(
            "Scanned {} mods and {} collections from {}",
            mods.len(),
            collections.len(),
            config.penumbra.path
        );

        Ok(RawScan { mods, collections })
    }
}

#[derive(Debug, Deserialize)]
struct SortOrderFile {
    #[serde(rename = "Data", default)]
    data: IndexMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct CollectionFile {
    #[serde(rename = "Name", default)]
    name: String,

    #[serde(rename = "Settings", default)]
    settings: IndexMap<String, CollectionSettings>,
}

#[derive(Debug, Deserialize)]
struct CollectionSettings {
    #[serde(rename = "Enabled", default)]
    enabled: bool,
}

/// Strip a leading UTF-8 byte order mark.
pub fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

/// Read a JSON file, ignoring a leading byte order mark.
fn read_json_file<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, ReadJsonError> {
    let bytes = fs::read(path).map_err(ReadJsonError::Io)?;
    serde_json::from_slice(strip_bom(&bytes)).map_err(ReadJsonError::Json)
}

enum ReadJsonError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

/// Mod names listed in `sort_order.json`, deduplicated, in file order.
///
/// The value of each entry is a folder path inside Penumbra's mod tree; only
/// its last segment (with either separator) names the mod directory.
pub fn read_sort_order(penumbra_path: &Utf8Path) -> Result<Vec<String>, ScanError> {
    let path = penumbra_path.join(SORT_ORDER_FILE);
    let sort_order: SortOrderFile = read_json_file(&path).map_err(|e| match e {
        ReadJsonError::Io(source) => ScanError::SortOrderUnreadable {
            path: path.clone(),
            source,
        },
        ReadJsonError::Json(source) => ScanError::MalformedSortOrder {
            path: path.clone(),
            source,
        },
    })?;

    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(sort_order.data.len());
    for value in sort_order.data.values() {
        let name = mod_name_from_sort_path(value);
        if name.is_empty() {
            continue;
        }
        if !seen.insert(name.to_string()) {
            tracing::warn!("Skipping duplicate mod: {}", name);
            continue;
        }
        names.push(name.to_string());
    }

    Ok(names)
}

fn mod_name_from_sort_path(value: &str) -> &str {
    value
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
}

fn load_mods(penumbra_path: &Utf8Path, mods_path: &Utf8Path) -> Result<Vec<RawMod>, ScanError> {
    let mut mods = Vec::new();

    for name in read_sort_order(penumbra_path)? {
        let path = mods_path.join(&name);
        if !path.is_dir() {
            tracing::warn!("Mod folder not found for {}: {}", name, path);
            continue;
        }

        let size = directory_size(&path);
        if size == 0 {
            tracing::info!("Skipping mod with size 0: {}", name);
            continue;
        }

        mods.push(RawMod { name, path, size });
    }

    mods.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(mods)
}

fn load_collections(penumbra_path: &Utf8Path) -> Result<Vec<RawCollection>, ScanError> {
    let folder = penumbra_path.join(COLLECTIONS_FOLDER);
    let entries = fs::read_dir(&folder).map_err(|source| ScanError::CollectionsUnreadable {
        path: folder.clone(),
        source,
    })?;

    let mut files: Vec<Utf8PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.path()).ok())
        .filter(|path| path.extension() == Some("json"))
        .collect();
    files.sort();

    let mut collections = Vec::with_capacity(files.len());
    for path in files {
        let file: CollectionFile = read_json_file(&path).map_err(|e| match e {
            ReadJsonError::Io(source) => ScanError::CollectionsUnreadable {
                path: path.clone(),
                source,
            },
            ReadJsonError::Json(source) => ScanError::MalformedCollection {
                path: path.clone(),
                source,
            },
        })?;

        let mods = file
            .settings
            .into_iter()
            .filter(|(_, settings)| settings.enabled)
            .map(|(name, _)| name)
            .collect::<Vec<_>>();

        tracing::debug!("Collection {} enables {} mods", file.name, mods.len());
        collections.push(RawCollection {
            name: file.name,
            mods,
        });
    }

    Ok(collections)
}

/// Total size in bytes of every file below `root`.
///
/// Entries that cannot be read are logged and skipped.
pub fn directory_size(root: &Utf8Path) -> u64 {
    let mut size = 0;

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Cannot access path under {}: {}", root, e);
                continue;
            }
        };

        if entry.file_type().is_file() {
            match entry.metadata() {
                Ok(metadata) => size += metadata.len(),
                Err(e) => {
                    tracing::warn!("Cannot get file info for {}: {}", entry.path().display(), e);
                }
            }
        }
    }

    size
}
