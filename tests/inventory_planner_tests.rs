//! Integration tests for scanning, inventory building and backup planning
//!
//! These tests verify:
//! - A Penumbra install on disk is scanned into the expected inventory
//! - Usage, stats and sizes follow collection membership
//! - Filters exclude mods case-insensitively, first match wins
//! - The full flow through the Aurora facade, from config to finished archive

use aurora::models::{AuroraConfig, PathConfig};
use aurora::services::{ModSource, PenumbraSource, RawCollection, RawMod, ScanError, inventory, planner};
use aurora::{Aurora, AuroraError, ConfigManager};
use camino::Utf8PathBuf;
use std::fs;
use tempfile::TempDir;
use tokio::time::{Duration, timeout};

const MB: u64 = 1024 * 1024;

/// Lay out a Penumbra config folder and a mods folder under a temp dir.
struct PenumbraFixture {
    _temp_dir: TempDir,
    root: Utf8PathBuf,
    penumbra: Utf8PathBuf,
    mods: Utf8PathBuf,
}

impl PenumbraFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let penumbra = root.join("Penumbra");
        let mods = root.join("mods");
        fs::create_dir_all(penumbra.join("collections")).unwrap();
        fs::create_dir_all(&mods).unwrap();

        Self {
            _temp_dir: temp_dir,
            root,
            penumbra,
            mods,
        }
    }

    fn sort_order(&self, entries: &[(&str, &str)]) {
        let data: serde_json::Map<String, serde_json::Value> = entries
            .iter()
            .map(|(key, value)| (key.to_string(), serde_json::Value::from(*value)))
            .collect();
        let json = serde_json::json!({ "Data": data });
        fs::write(self.penumbra.join("sort_order.json"), json.to_string()).unwrap();
    }

    fn collection(&self, file: &str, name: &str, mods: &[(&str, bool)]) {
        let settings: serde_json::Map<String, serde_json::Value> = mods
            .iter()
            .map(|(m, enabled)| (m.to_string(), serde_json::json!({ "Enabled": enabled })))
            .collect();
        let json = serde_json::json!({ "Name": name, "Settings": settings });

        // Penumbra writes its files with a byte order mark
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice(json.to_string().as_bytes());
        fs::write(self.penumbra.join("collections").join(file), bytes).unwrap();
    }

    fn mod_folder(&self, name: &str, bytes: usize) {
        let dir = self.mods.join(name).join("files");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("data.bin"), vec![7u8; bytes]).unwrap();
    }

    fn config(&self) -> AuroraConfig {
        AuroraConfig {
            penumbra: PathConfig::new(&self.penumbra),
            mods: PathConfig::new(&self.mods),
            output_dir: self.root.join("backups"),
            ..AuroraConfig::default()
        }
    }

    /// Standard install: three mods, two collections, one unused mod.
    fn standard() -> Self {
        let fixture = Self::new();
        fixture.sort_order(&[
            ("a", "Gear/WeaponRetex"),
            ("b", "Hair\\Bob Cut"),
            ("c", "Unused Thing"),
        ]);
        fixture.mod_folder("WeaponRetex", 4000);
        fixture.mod_folder("Bob Cut", 2000);
        fixture.mod_folder("Unused Thing", 1000);
        fixture.collection(
            "1_main.json",
            "Main",
            &[("WeaponRetex", true), ("Bob Cut", true), ("Unused Thing", false)],
        );
        fixture.collection("2_alt.json", "Alt", &[("Bob Cut", true)]);
        fixture
    }
}

fn raw(name: &str, size: u64) -> RawMod {
    RawMod {
        name: name.to_string(),
        path: Utf8PathBuf::from("/mods").join(name),
        size,
    }
}

#[test]
fn test_end_to_end_three_mod_scenario() {
    let mods = vec![raw("A", 100 * MB), raw("B", 200 * MB), raw("C", 50 * MB)];
    let collections = vec![
        RawCollection {
            name: "First".to_string(),
            mods: vec!["A".to_string(), "C".to_string()],
        },
        RawCollection {
            name: "Second".to_string(),
            mods: vec!["C".to_string()],
        },
    ];

    let inventory = inventory::build(mods, collections);

    assert_eq!(inventory.stats.total_mods, 3);
    assert_eq!(inventory.stats.used_mods, 2);
    assert_eq!(inventory.stats.unused_mods, 1);
    assert_eq!(inventory.stats.total_disk_size, 350 * MB);
    assert_eq!(inventory.stats.used_disk_size, 150 * MB);
    assert_eq!(inventory.stats.total_disk_size_human, "350.0 MB");

    let plan = planner::validate(&inventory, &["A".to_string()]);

    let names: Vec<&str> = plan.items.iter().map(|i| i.mod_entry.name.as_str()).collect();
    assert_eq!(names, vec!["A", "C"]);
    assert!(plan.items[0].is_filtered);
    assert_eq!(plan.items[0].filtered_by.as_deref(), Some("A"));
    assert!(!plan.items[1].is_filtered);
    assert_eq!(plan.total_size, 150 * MB);
    assert_eq!(plan.estimated_size, 12 * MB + MB / 2);
    assert_eq!(plan.estimated_size_human, "12.5 MB");
}

#[test]
fn test_newly_excluded_mod_reduces_estimate_by_its_share() {
    let mods = vec![raw("Keep", 4000), raw("Drop", 8000)];
    let collections = vec![RawCollection {
        name: "Only".to_string(),
        mods: vec!["Keep".to_string(), "Drop".to_string()],
    }];
    let inventory = inventory::build(mods, collections);

    let before = planner::validate(&inventory, &[]);
    let after = planner::validate(&inventory, &["drop".to_string()]);

    assert_eq!(before.estimated_size - after.estimated_size, 2000);
    assert_eq!(before.total_size, after.total_size);
}

#[test]
fn test_scan_standard_install() {
    let fixture = PenumbraFixture::standard();

    let scan = PenumbraSource.scan(&fixture.config()).unwrap();
    let names: Vec<&str> = scan.mods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Bob Cut", "Unused Thing", "WeaponRetex"]);
    assert_eq!(scan.collections.len(), 2);
    assert_eq!(scan.collections[0].name, "Main");
    let mut main_mods = scan.collections[0].mods.clone();
    main_mods.sort();
    assert_eq!(main_mods, vec!["Bob Cut", "WeaponRetex"]);

    let inventory = inventory::build(scan.mods, scan.collections);
    assert_eq!(inventory.stats.used_mods, 2);
    assert_eq!(inventory.stats.used_disk_size, 6000);

    let bob = inventory.find_mod("Bob Cut").unwrap();
    assert_eq!(bob.collections, vec!["Main".to_string(), "Alt".to_string()]);
    assert!(!inventory.find_mod("Unused Thing").unwrap().is_used());
}

#[test]
fn test_scan_skips_missing_and_empty_mods() {
    let fixture = PenumbraFixture::new();
    fixture.sort_order(&[("a", "Present"), ("b", "Absent"), ("c", "Empty")]);
    fixture.mod_folder("Present", 10);
    fs::create_dir_all(fixture.mods.join("Empty")).unwrap();

    let scan = PenumbraSource.scan(&fixture.config()).unwrap();

    assert_eq!(scan.mods.len(), 1);
    assert_eq!(scan.mods[0].name, "Present");
    assert_eq!(scan.mods[0].size, 10);
}

#[test]
fn test_malformed_collection_fails_scan() {
    let fixture = PenumbraFixture::standard();
    fs::write(fixture.penumbra.join("collections").join("3_bad.json"), "{ not json").unwrap();

    let err = PenumbraSource.scan(&fixture.config()).unwrap_err();

    assert!(matches!(err, ScanError::MalformedCollection { .. }));
}

#[test]
fn test_filters_are_case_insensitive_and_ordered() {
    let fixture = PenumbraFixture::standard();
    let scan = PenumbraSource.scan(&fixture.config()).unwrap();
    let inventory = inventory::build(scan.mods, scan.collections);

    let plan = planner::validate(&inventory, &["weapon".to_string(), "WEAP".to_string()]);

    let weapon = plan
        .items
        .iter()
        .find(|i| i.mod_entry.name == "WeaponRetex")
        .unwrap();
    assert_eq!(weapon.filtered_by.as_deref(), Some("weapon"));
    assert_eq!(plan.included_count(), 1);
}

#[tokio::test]
async fn test_facade_full_backup() {
    let fixture = PenumbraFixture::standard();
    let config_dir = fixture.root.join("config");
    let manager = ConfigManager::new(&config_dir).unwrap();
    manager.save(&fixture.config()).unwrap();

    let app = Aurora::open(manager).unwrap();
    assert!(app.get_config().status.valid);

    app.add_filter("bob").unwrap();
    let plan = app.validate_backup().unwrap();
    assert_eq!(plan.included_count(), 1);

    let run = app.run_backup(Some(1)).unwrap();
    assert!(matches!(
        app.run_backup(Some(1)),
        Err(AuroraError::Backup(aurora::services::BackupError::Busy))
    ));

    let result = timeout(Duration::from_secs(30), run.wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.mods_archived, 1);
    assert_eq!(result.output_path, "backup.zip");
    assert!(fixture.root.join("backups").join("backup.zip").is_file());

    let state = app.state().snapshot();
    assert!(!state.is_backing_up);
    assert_eq!(state.last_result, Some(result));
}

#[test]
fn test_facade_reports_invalid_paths_as_status() {
    let fixture = PenumbraFixture::new();
    let config_dir = fixture.root.join("config");
    let manager = ConfigManager::new(&config_dir).unwrap();
    manager
        .save(&AuroraConfig {
            penumbra: PathConfig::new(fixture.root.join("nowhere")),
            mods: PathConfig::new(&fixture.mods),
            ..AuroraConfig::default()
        })
        .unwrap();

    let app = Aurora::open(manager).unwrap();
    let config = app.get_config();

    assert!(!config.status.valid);
    assert_eq!(config.status.penumbra_status, "Invalid Penumbra path");
    assert!(matches!(app.get_collections(), Err(AuroraError::Scan(_))));
}
