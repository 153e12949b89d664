use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Units used by [`format_size`], in ascending order.
const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// A unit of installable content tracked by name, location and size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mod {
    /// Display identifier, unique within one inventory snapshot
    pub name: String,

    /// Directory holding the mod files
    pub path: Utf8PathBuf,

    /// Byte count on disk
    pub size: u64,

    /// Human-readable `size`
    pub size_human: String,

    /// Names of the collections this mod belongs to (empty = unused)
    pub collections: Vec<String>,
}

impl Mod {
    pub fn new(name: impl Into<String>, path: impl Into<Utf8PathBuf>, size: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
            size_human: format_size(size),
            collections: Vec::new(),
        }
    }

    /// A mod is "used" when at least one collection enables it.
    pub fn is_used(&self) -> bool {
        !self.collections.is_empty()
    }
}

/// A named grouping of mods.
///
/// Collections share mod data with the flat inventory list, a mod may be
/// listed by several collections at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub name: String,
    pub mods: Vec<Arc<Mod>>,
}

/// Aggregate figures derived from one inventory build. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_mods: usize,
    pub used_mods: usize,
    pub unused_mods: usize,
    pub total_disk_size: u64,
    pub total_disk_size_human: String,
    pub used_disk_size: u64,
    pub used_disk_size_human: String,
    pub collection_count: usize,
}

/// Immutable snapshot of the scanned mods and collections.
///
/// Rebuilt wholesale on every scan request, never patched in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub collections: Vec<Collection>,
    pub mods: Vec<Arc<Mod>>,
    pub stats: Stats,
}

impl Inventory {
    /// Mods enabled by at least one collection, in inventory order.
    pub fn used_mods(&self) -> impl Iterator<Item = &Arc<Mod>> {
        self.mods.iter().filter(|m| m.is_used())
    }

    /// Mods that no collection enables, in inventory order.
    pub fn unused_mods(&self) -> impl Iterator<Item = &Arc<Mod>> {
        self.mods.iter().filter(|m| !m.is_used())
    }

    pub fn find_mod(&self, name: &str) -> Option<&Arc<Mod>> {
        self.mods.iter().find(|m| m.name == name)
    }
}

/// Format a byte count with binary prefixes and one decimal place.
///
/// Values below 1024 are printed as whole bytes (`"512 B"`), larger values
/// are divided by 1024 until they fit (`"1.5 KB"`, `"1.2 GB"`). TB is the
/// largest unit.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    // Compare the rounded value so 1023.95 KB prints as 1.0 MB
    while (value * 10.0).round() / 10.0 >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.1} {}", value, SIZE_UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_bytes() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
    }

    #[test]
    fn test_format_size_prefixes() {
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(100 * 1024 * 1024), "100.0 MB");
        assert_eq!(format_size(1288490189), "1.2 GB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024 * 1024), "5.0 TB");
    }

    #[test]
    fn test_format_size_promotes_after_rounding() {
        assert_eq!(format_size(1048575), "1.0 MB");
        assert_eq!(format_size(1048524), "1023.9 KB");
        assert_eq!(format_size(1024 * 1024 * 1024 - 1), "1.0 GB");
    }

    #[test]
    fn test_format_size_caps_at_terabytes() {
        assert_eq!(format_size(2048 * 1024 * 1024 * 1024 * 1024), "2048.0 TB");
    }

    #[test]
    fn test_mod_is_used() {
        let mut m = Mod::new("Weapons", "/mods/Weapons", 10);
        assert!(!m.is_used());
        assert_eq!(m.size_human, "10 B");

        m.collections.push("Default".to_string());
        assert!(m.is_used());
    }
}
