//! Data models for the Aurora backup engine.
//!
//! This module contains all the core data structures used throughout the application:
//! - [`Mod`], [`Collection`], [`Stats`], [`Inventory`]: the scanned mod corpus and its collection membership
//! - [`BackupItem`], [`BackupValidation`]: the plan computed from an inventory and the filter list
//! - [`BackupProgress`], [`BackupResult`]: what a backup run reports while and after it runs
//! - [`AuroraConfig`], [`ConfigStatus`], [`ConfigResult`]: persisted settings and their validity
//! - [`AppState`]: the central state container wrapped by [`StateManager`](crate::state::StateManager)
//!
//! # Architecture Note
//!
//! Everything that crosses the application boundary derives `Serialize` with
//! camelCase field names, so the `--json` output of the CLI mirrors the field
//! names used by the desktop client.

pub mod app_state;
pub mod backup;
pub mod config;
pub mod inventory;

pub use app_state::AppState;
pub use backup::{
    BackupItem, BackupProgress, BackupResult, BackupValidation, SpaceCheck, format_ratio,
};
pub use config::{AuroraConfig, ConfigResult, ConfigStatus, MAX_CONCURRENCY, PathConfig};
pub use inventory::{Collection, Inventory, Mod, Stats, format_size};
