//! Inventory builder.
//!
//! Turns the raw scan output into an [`Inventory`]: unique mods, collections
//! that reference those mods, and the aggregate [`Stats`]. The whole inventory
//! is rebuilt on every scan.

use super::scanner::{RawCollection, RawMod};
use crate::models::{Collection, Inventory, Mod, Stats, format_size};
use camino::Utf8PathBuf;
use std::collections::HashMap;
use std::sync::Arc;

/// Build an inventory from raw scan data.
///
/// Mods are deduplicated by path: when two entries share a path the later
/// one replaces the earlier one in place and a warning is logged. An entry
/// reusing the name of a different mod replaces it the same way, so names
/// stay unique. Collection members that name no known mod are dropped.
///
/// Runs in O(mods + collection members).
pub fn build(raw_mods: Vec<RawMod>, raw_collections: Vec<RawCollection>) -> Inventory {
    let mut slots: Vec<Option<RawMod>> = Vec::with_capacity(raw_mods.len());
    let mut by_path: HashMap<Utf8PathBuf, usize> = HashMap::with_capacity(raw_mods.len());
    let mut by_name: HashMap<String, usize> = HashMap::with_capacity(raw_mods.len());

    for raw in raw_mods {
        let path_slot = by_path.get(&raw.path).copied();
        let name_slot = by_name.get(&raw.name).copied();

        let index = match (path_slot, name_slot) {
            (None, None) => {
                slots.push(None);
                slots.len() - 1
            }
            (Some(index), other) | (None, other @ Some(index)) => {
                tracing::warn!(
                    "Duplicate mod entry {} at {}, keeping the later one",
                    raw.name,
                    raw.path
                );
                // A path match and a name match on two different slots
                // collapse into the path slot.
                if let Some(other) = other.filter(|&other| other != index) {
                    if let Some(evicted) = slots[other].take() {
                        by_path.remove(&evicted.path);
                        by_name.remove(&evicted.name);
                    }
                }
                if let Some(replaced) = slots[index].take() {
                    by_path.remove(&replaced.path);
                    by_name.remove(&replaced.name);
                }
                index
            }
        };

        by_path.insert(raw.path.clone(), index);
        by_name.insert(raw.name.clone(), index);
        slots[index] = Some(raw);
    }

    // Compact, keeping first-seen order
    let raws: Vec<RawMod> = slots.into_iter().flatten().collect();
    let index_of: HashMap<&str, usize> = raws
        .iter()
        .enumerate()
        .map(|(i, raw)| (raw.name.as_str(), i))
        .collect();

    // Resolve memberships
    let mut memberships: Vec<Vec<String>> = vec![Vec::new(); raws.len()];
    let mut members: Vec<(String, Vec<usize>)> = Vec::with_capacity(raw_collections.len());
    for collection in raw_collections {
        let mut indices = Vec::with_capacity(collection.mods.len());
        for mod_name in &collection.mods {
            match index_of.get(mod_name.as_str()) {
                Some(&i) => {
                    if memberships[i].last() != Some(&collection.name) {
                        memberships[i].push(collection.name.clone());
                        indices.push(i);
                    }
                }
                None => {
                    tracing::debug!(
                        "Collection {} references unknown mod {}",
                        collection.name,
                        mod_name
                    );
                }
            }
        }
        members.push((collection.name, indices));
    }

    let mods: Vec<Arc<Mod>> = raws
        .into_iter()
        .zip(memberships)
        .map(|(raw, collections)| {
            let mut m = Mod::new(raw.name, raw.path, raw.size);
            m.collections = collections;
            Arc::new(m)
        })
        .collect();

    let collections: Vec<Collection> = members
        .into_iter()
        .map(|(name, indices)| Collection {
            name,
            mods: indices.into_iter().map(|i| Arc::clone(&mods[i])).collect(),
        })
        .collect();

    let stats = compute_stats(&mods, collections.len());

    tracing::info!(
        "Inventory built: {} mods ({} used, {} unused), {} collections",
        stats.total_mods,
        stats.used_mods,
        stats.unused_mods,
        stats.collection_count
    );

    Inventory {
        collections,
        mods,
        stats,
    }
}

/// Aggregate statistics in a single pass over the mods.
pub fn compute_stats(mods: &[Arc<Mod>], collection_count: usize) -> Stats {
    let mut stats = Stats {
        collection_count,
        ..Stats::default()
    };

    for m in mods {
        stats.total_mods += 1;
        stats.total_disk_size += m.size;
        if m.is_used() {
            stats.used_mods += 1;
            stats.used_disk_size += m.size;
        } else {
            stats.unused_mods += 1;
        }
    }

    stats.total_disk_size_human = format_size(stats.total_disk_size);
    stats.used_disk_size_human = format_size(stats.used_disk_size);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    fn raw(name: &str, size: u64) -> RawMod {
        RawMod {
            name: name.to_string(),
            path: Utf8PathBuf::from(format!("/mods/{}", name)),
            size,
        }
    }

    fn collection(name: &str, mods: &[&str]) -> RawCollection {
        RawCollection {
            name: name.to_string(),
            mods: mods.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn test_build_three_mod_scenario() {
        let inventory = build(
            vec![raw("A", 100 * MB), raw("B", 200 * MB), raw("C", 50 * MB)],
            vec![collection("Default", &["A", "C"]), collection("Gpose", &["C"])],
        );

        assert_eq!(inventory.stats.total_mods, 3);
        assert_eq!(inventory.stats.used_mods, 2);
        assert_eq!(inventory.stats.unused_mods, 1);
        assert_eq!(inventory.stats.total_disk_size, 350 * MB);
        assert_eq!(inventory.stats.used_disk_size, 150 * MB);
        assert_eq!(inventory.stats.collection_count, 2);
        assert_eq!(inventory.stats.used_disk_size_human, "150.0 MB");

        let c = inventory.find_mod("C").unwrap();
        assert_eq!(c.collections, vec!["Default".to_string(), "Gpose".to_string()]);
        assert!(!inventory.find_mod("B").unwrap().is_used());
    }

    #[test]
    fn test_collections_share_mod_data() {
        let inventory = build(
            vec![raw("A", 1)],
            vec![collection("One", &["A"]), collection("Two", &["A"])],
        );

        assert!(Arc::ptr_eq(&inventory.collections[0].mods[0], &inventory.mods[0]));
        assert!(Arc::ptr_eq(&inventory.collections[1].mods[0], &inventory.mods[0]));
    }

    #[test]
    fn test_duplicate_path_last_write_wins() {
        let mut later = raw("A", 999);
        later.name = "A renamed".to_string();

        let inventory = build(vec![raw("A", 1), raw("B", 2), later], vec![]);

        assert_eq!(inventory.mods.len(), 2);
        assert_eq!(inventory.mods[0].name, "A renamed");
        assert_eq!(inventory.mods[0].size, 999);
        assert_eq!(inventory.mods[1].name, "B");
    }

    #[test]
    fn test_duplicate_name_keeps_names_unique() {
        let mut other = raw("A", 5);
        other.path = Utf8PathBuf::from("/elsewhere/A");

        let inventory = build(vec![raw("A", 1), other], vec![collection("Default", &["A"])]);

        assert_eq!(inventory.mods.len(), 1);
        assert_eq!(inventory.mods[0].path, "/elsewhere/A");
        assert_eq!(inventory.stats.used_mods, 1);
    }

    #[test]
    fn test_unknown_collection_members_are_dropped() {
        let inventory = build(vec![raw("A", 1)], vec![collection("Default", &["A", "Ghost"])]);

        assert_eq!(inventory.collections[0].mods.len(), 1);
        assert_eq!(inventory.stats.used_mods, 1);
    }

    #[test]
    fn test_membership_matches_collection_lists() {
        let inventory = build(
            vec![raw("A", 1), raw("B", 2), raw("C", 3), raw("D", 4)],
            vec![collection("X", &["A", "B"]), collection("Y", &["B", "D"])],
        );

        for m in &inventory.mods {
            let listed = inventory
                .collections
                .iter()
                .any(|c| c.mods.iter().any(|cm| cm.name == m.name));
            assert_eq!(m.is_used(), listed, "mod {}", m.name);
        }
        assert_eq!(inventory.stats.used_mods, inventory.used_mods().count());
    }

    #[test]
    fn test_empty_inventory() {
        let inventory = build(vec![], vec![]);
        assert_eq!(inventory.stats.total_mods, 0);
        assert_eq!(inventory.stats.total_disk_size_human, "0 B");
    }
}
