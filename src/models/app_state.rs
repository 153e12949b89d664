use super::backup::{BackupResult, BackupValidation};
use super::config::{AuroraConfig, ConfigStatus};
use super::inventory::Inventory;
use std::sync::Arc;

/// Single source of truth for all application state.
///
/// Holds the persisted configuration, its derived validity, the most recent
/// inventory and backup plan, and the state of the running backup.
///
/// # Thread Safety
///
/// `AppState` is wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`]
/// to provide thread-safe access across the application. Never access `AppState`
/// directly - always use [`StateManager`](crate::state::StateManager) methods:
/// - [`read()`](crate::state::StateManager::read) for read-only access
/// - [`update()`](crate::state::StateManager::update) for mutations with automatic change events
///
/// The inventory and plan are kept behind `Arc` so that the snapshot taken by
/// every `update()` stays cheap.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    // Configuration
    pub config: AuroraConfig,
    pub status: ConfigStatus,

    // Scan and planning
    pub inventory: Option<Arc<Inventory>>,
    pub validation: Option<Arc<BackupValidation>>,

    // Runtime state
    pub is_backing_up: bool,
    pub current_mod: Option<String>,
    pub progress_percent: f64,

    // Results
    pub last_result: Option<BackupResult>,
    pub last_error: Option<String>,
}

impl AppState {
    /// Check whether both configured paths passed validation.
    pub fn is_fully_configured(&self) -> bool {
        self.status.valid
    }

    /// Drop the cached plan.
    ///
    /// A plan is only meaningful for the filters and inventory it was computed
    /// from, so any change to either discards it.
    pub fn invalidate_plan(&mut self) {
        self.validation = None;
    }

    /// Mods included in the cached plan and their total size.
    ///
    /// Returns `(0, 0)` when no plan has been computed.
    pub fn plan_summary(&self) -> (usize, u64) {
        match &self.validation {
            Some(plan) => (plan.included_count(), plan.included_size()),
            None => (0, 0),
        }
    }

    /// Reset all backup-run state to initial values.
    pub fn reset_backup_state(&mut self) {
        self.is_backing_up = false;
        self.current_mod = None;
        self.progress_percent = 0.0;
        self.last_result = None;
        self.last_error = None;
    }
}
