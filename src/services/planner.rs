//! Backup planner.
//!
//! Applies the filter list to an inventory and produces the
//! [`BackupValidation`] shown before a run. Planning is pure and cheap enough
//! to repeat on every filter or concurrency change; the disk-space check is a
//! separate step because it queries the system.

use super::filter::first_match;
use crate::models::backup::{DISK_SPACE_MARGIN, ESTIMATED_COMPRESSION_RATIO};
use crate::models::{BackupItem, BackupValidation, Inventory, SpaceCheck, format_size};
use camino::{Utf8Path, Utf8PathBuf};
use sysinfo::Disks;

/// Compute the backup plan for an inventory and an ordered filter list.
///
/// Only used mods are candidates. Items follow inventory order, so repeated
/// calls with the same inputs produce identical plans.
///
/// `total_size` covers every used mod, filtered or not, while `estimated_size`
/// only counts the mods that would actually be archived.
pub fn validate(inventory: &Inventory, filters: &[String]) -> BackupValidation {
    let mut items = Vec::with_capacity(inventory.stats.used_mods);
    let mut total_size = 0u64;
    let mut included_size = 0u64;

    for m in inventory.used_mods() {
        total_size += m.size;
        match first_match(m, filters) {
            Some(filter) => items.push(BackupItem::excluded((**m).clone(), filter)),
            None => {
                included_size += m.size;
                items.push(BackupItem::included((**m).clone()));
            }
        }
    }

    let estimated_size = estimate_size(included_size);

    BackupValidation {
        items,
        total_size,
        total_size_human: format_size(total_size),
        estimated_size,
        estimated_size_human: format_size(estimated_size),
        space: None,
    }
}

/// Compressed-size estimate: a flat 25% of the input, rounded to the nearest byte.
pub fn estimate_size(included_size: u64) -> u64 {
    (included_size as f64 * ESTIMATED_COMPRESSION_RATIO).round() as u64
}

/// Free space needed to write an archive of `estimated_size` bytes.
pub fn required_space(estimated_size: u64) -> u64 {
    (estimated_size as f64 * DISK_SPACE_MARGIN).ceil() as u64
}

/// Compare the space available for `output_dir` against the plan estimate.
pub fn space_check(available: u64, estimated_size: u64) -> SpaceCheck {
    let required = required_space(estimated_size);
    SpaceCheck {
        available,
        required,
        has_enough_space: available >= required,
    }
}

/// Attach a disk-space check for `output_dir` to a plan.
///
/// Leaves `space` empty when the volume cannot be determined.
pub fn with_space_check(mut plan: BackupValidation, output_dir: &Utf8Path) -> BackupValidation {
    plan.space = available_space(output_dir).map(|available| space_check(available, plan.estimated_size));
    plan
}

/// Free bytes on the volume holding `dir`.
///
/// Picks the disk with the longest mount point that prefixes the directory.
pub fn available_space(dir: &Utf8Path) -> Option<u64> {
    let target = resolve_existing(dir)?;
    let disks = Disks::new_with_refreshed_list();

    disks
        .list()
        .iter()
        .filter(|disk| target.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| {
            tracing::debug!(
                "Output volume for {} is {} ({} free)",
                target,
                disk.mount_point().display(),
                format_size(disk.available_space())
            );
            disk.available_space()
        })
}

/// Canonicalize `dir`, walking up to the nearest existing ancestor.
fn resolve_existing(dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let mut current = Some(dir);
    while let Some(path) = current {
        let probe = if path.as_str().is_empty() {
            Utf8Path::new(".")
        } else {
            path
        };
        if let Ok(resolved) = probe.canonicalize_utf8() {
            return Some(resolved);
        }
        current = path.parent();
    }
    None
}
