// State management module
//
// This module provides the StateManager which wraps AppState with thread-safe access
// using Arc<RwLock<T>> and emits change events to observers.

use crate::models::{
    AppState, AuroraConfig, BackupProgress, BackupResult, BackupValidation, ConfigStatus,
    Inventory,
};
use crate::services::executor::{BackupError, RunObserver};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// These events notify interested parties (the CLI progress display, or any
/// other front end) about state changes without requiring them to poll.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// Configured paths or their validity changed
    ConfigurationChanged { is_fully_configured: bool },

    /// The ordered filter list changed
    FiltersChanged { filters: Vec<String> },

    /// The worker count changed
    ConcurrencyChanged { concurrency: u32 },

    /// A new inventory replaced the previous one
    InventoryRebuilt { total_mods: usize, used_mods: usize },

    /// A new backup plan was computed
    ValidationUpdated { included: usize, excluded: usize },

    /// The cached plan was discarded
    PlanInvalidated,

    /// Progress has been updated during a backup
    ProgressUpdated {
        percent: f64,
        current_mod: Option<String>,
    },

    /// A backup run has started
    BackupStarted { mods: usize },

    /// A backup run has finished
    BackupFinished {
        success: bool,
        error: Option<String>,
    },
}

/// Thread-safe state manager with event emission
///
/// This is the central state management component that:
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Discards the cached plan whenever the inputs it was computed from change
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// # Usage
///
/// Always use `StateManager` instead of accessing [`AppState`] directly:
/// - [`read()`](Self::read) for reading state
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
///
/// `StateManager` is also a [`RunObserver`], so handing it to a
/// [`BackupExecutor`](crate::services::BackupExecutor) keeps `is_backing_up`
/// and the last result in sync with the run.
pub struct StateManager {
    /// The application state protected by RwLock for thread-safe access
    state: Arc<RwLock<AppState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// # Returns
    /// A new StateManager with a broadcast channel buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Get a copy of the current state
    ///
    /// Inventory and plan are shared through `Arc`, so this stays cheap.
    pub fn snapshot(&self) -> AppState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let is_configured = state_manager.read(|state| state.is_fully_configured());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// This is the primary way to modify state. It:
    /// 1. Captures the old state
    /// 2. Applies the update function
    /// 3. Detects what changed
    /// 4. Emits appropriate events
    ///
    /// # Arguments
    /// * `update_fn` - A function that mutates the state
    ///
    /// # Returns
    /// A vector of StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    ///
    /// Returns a receiver that will get notified of all future state changes.
    /// Multiple subscribers can listen simultaneously.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Detect what changed between two states and generate events
    fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.config.penumbra != new.config.penumbra
            || old.config.mods != new.config.mods
            || old.status != new.status
        {
            changes.push(StateChange::ConfigurationChanged {
                is_fully_configured: new.is_fully_configured(),
            });
        }

        if old.config.filters != new.config.filters {
            changes.push(StateChange::FiltersChanged {
                filters: new.config.filters.clone(),
            });
        }

        if old.config.concurrency != new.config.concurrency {
            changes.push(StateChange::ConcurrencyChanged {
                concurrency: new.config.concurrency,
            });
        }

        if !same_arc(&old.inventory, &new.inventory) {
            if let Some(inventory) = &new.inventory {
                changes.push(StateChange::InventoryRebuilt {
                    total_mods: inventory.stats.total_mods,
                    used_mods: inventory.stats.used_mods,
                });
            }
        }

        if !same_arc(&old.validation, &new.validation) {
            match &new.validation {
                Some(plan) => {
                    let included = plan.included_count();
                    changes.push(StateChange::ValidationUpdated {
                        included,
                        excluded: plan.items.len() - included,
                    });
                }
                None => changes.push(StateChange::PlanInvalidated),
            }
        }

        if old.is_backing_up != new.is_backing_up {
            if new.is_backing_up {
                changes.push(StateChange::BackupStarted {
                    mods: new.plan_summary().0,
                });
            } else {
                changes.push(StateChange::BackupFinished {
                    success: new.last_result.is_some() && new.last_error.is_none(),
                    error: new.last_error.clone(),
                });
            }
        }

        if old.progress_percent != new.progress_percent || old.current_mod != new.current_mod {
            changes.push(StateChange::ProgressUpdated {
                percent: new.progress_percent,
                current_mod: new.current_mod.clone(),
            });
        }

        changes
    }

    // Convenience methods for common state updates

    /// Replace the configuration and its status.
    ///
    /// A plan computed from different filters or paths is discarded, and an
    /// inventory scanned from different paths is dropped.
    pub fn apply_config(&self, config: AuroraConfig, status: ConfigStatus) -> Vec<StateChange> {
        self.update(|state| {
            let paths_changed =
                state.config.penumbra != config.penumbra || state.config.mods != config.mods;
            let plan_inputs_changed = paths_changed
                || state.config.filters != config.filters
                || state.config.concurrency != config.concurrency;

            if paths_changed {
                state.inventory = None;
            }
            if plan_inputs_changed {
                state.invalidate_plan();
            }

            state.config = config;
            state.status = status;
        })
    }

    /// Store a freshly built inventory; any cached plan is discarded.
    pub fn set_inventory(&self, inventory: Arc<Inventory>) -> Vec<StateChange> {
        self.update(|state| {
            state.inventory = Some(inventory);
            state.invalidate_plan();
        })
    }

    /// Store a freshly computed plan
    pub fn set_validation(&self, validation: Arc<BackupValidation>) -> Vec<StateChange> {
        self.update(|state| {
            state.validation = Some(validation);
        })
    }

    /// Discard the cached plan
    pub fn invalidate_plan(&self) -> Vec<StateChange> {
        self.update(|state| state.invalidate_plan())
    }

    /// Mark a backup as started
    pub fn start_backup(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.reset_backup_state();
            state.is_backing_up = true;
        })
    }

    /// Mark the running backup as finished
    pub fn finish_backup(&self, outcome: &Result<BackupResult, BackupError>) -> Vec<StateChange> {
        self.update(|state| {
            state.is_backing_up = false;
            match outcome {
                Ok(result) => {
                    state.last_result = Some(result.clone());
                    state.last_error = None;
                }
                Err(e) => {
                    state.last_result = None;
                    state.last_error = Some(e.to_string());
                }
            }
        })
    }

    /// Mirror a progress event into the state
    pub fn record_progress(&self, progress: &BackupProgress) -> Vec<StateChange> {
        self.update(|state| {
            state.progress_percent = progress.percent;
            state.current_mod = (!progress.current.is_empty()).then(|| progress.current.clone());
        })
    }
}

impl RunObserver for StateManager {
    fn on_start(&self, plan: &BackupValidation) {
        tracing::debug!("Backup started with {} mods", plan.included_count());
        self.start_backup();
    }

    fn on_finish(&self, outcome: &Result<BackupResult, BackupError>) {
        self.finish_backup(outcome);
    }
}

fn same_arc<T>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across threads
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::STATUS_OK;
    use crate::models::{BackupItem, Mod, PathConfig, Stats};

    fn plan() -> Arc<BackupValidation> {
        Arc::new(BackupValidation {
            items: vec![
                BackupItem::included(Mod::new("A", "/m/A", 10)),
                BackupItem::excluded(Mod::new("B", "/m/B", 20), "b"),
            ],
            total_size: 30,
            total_size_human: "30 B".to_string(),
            estimated_size: 3,
            estimated_size_human: "3 B".to_string(),
            space: None,
        })
    }

    fn inventory(total: usize, used: usize) -> Arc<Inventory> {
        Arc::new(Inventory {
            stats: Stats {
                total_mods: total,
                used_mods: used,
                ..Stats::default()
            },
            ..Inventory::default()
        })
    }

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        let state = manager.snapshot();

        assert!(!state.is_backing_up);
        assert!(!state.is_fully_configured());
        assert!(state.inventory.is_none());
    }

    #[test]
    fn test_apply_config_emits_configuration_events() {
        let manager = StateManager::new();
        let config = AuroraConfig {
            mods: PathConfig::new("/mods"),
            filters: vec!["weapon".to_string()],
            concurrency: 2,
            ..AuroraConfig::default()
        };

        let changes = manager.apply_config(config, ConfigStatus::new(STATUS_OK, STATUS_OK));

        assert_eq!(
            changes,
            vec![
                StateChange::ConfigurationChanged {
                    is_fully_configured: true
                },
                StateChange::FiltersChanged {
                    filters: vec!["weapon".to_string()]
                },
                StateChange::ConcurrencyChanged { concurrency: 2 },
            ]
        );
    }

    #[test]
    fn test_filter_change_invalidates_plan() {
        let manager = StateManager::new();
        manager.set_validation(plan());

        let mut config = manager.read(|s| s.config.clone());
        config.filters.push("hair".to_string());
        let changes = manager.apply_config(config, ConfigStatus::default());

        assert!(changes.contains(&StateChange::PlanInvalidated));
        assert!(manager.read(|s| s.validation.is_none()));
    }

    #[test]
    fn test_path_change_drops_inventory() {
        let manager = StateManager::new();
        manager.set_inventory(inventory(3, 2));

        let mut config = manager.read(|s| s.config.clone());
        config.mods = PathConfig::new("/elsewhere");
        manager.apply_config(config, ConfigStatus::default());

        assert!(manager.read(|s| s.inventory.is_none()));
    }

    #[test]
    fn test_unchanged_config_keeps_plan() {
        let manager = StateManager::new();
        manager.set_validation(plan());

        let config = manager.read(|s| s.config.clone());
        let changes = manager.apply_config(config, ConfigStatus::default());

        assert!(changes.is_empty());
        assert!(manager.read(|s| s.validation.is_some()));
    }

    #[test]
    fn test_set_inventory_and_validation() {
        let manager = StateManager::new();

        let changes = manager.set_inventory(inventory(3, 2));
        assert_eq!(
            changes,
            vec![StateChange::InventoryRebuilt {
                total_mods: 3,
                used_mods: 2
            }]
        );

        let changes = manager.set_validation(plan());
        assert_eq!(
            changes,
            vec![StateChange::ValidationUpdated {
                included: 1,
                excluded: 1
            }]
        );

        let changes = manager.set_inventory(inventory(4, 2));
        assert!(changes.contains(&StateChange::PlanInvalidated));
    }

    #[test]
    fn test_backup_lifecycle() {
        let manager = StateManager::new();
        manager.set_validation(plan());

        let changes = manager.start_backup();
        assert_eq!(changes, vec![StateChange::BackupStarted { mods: 1 }]);

        manager.record_progress(&BackupProgress {
            percent: 50.0,
            current: "A".to_string(),
            done: false,
            error: None,
        });
        assert_eq!(manager.read(|s| s.current_mod.clone()), Some("A".to_string()));

        let changes = manager.finish_backup(&Err(BackupError::Cancelled));
        assert!(changes.contains(&StateChange::BackupFinished {
            success: false,
            error: Some("Backup cancelled".to_string()),
        }));

        let state = manager.snapshot();
        assert!(!state.is_backing_up);
        assert_eq!(state.last_error.as_deref(), Some("Backup cancelled"));
    }

    #[test]
    fn test_subscribe_to_changes() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();

        manager.start_backup();

        let event = rx.try_recv();
        assert!(matches!(event, Ok(StateChange::BackupStarted { .. })));
    }

    #[test]
    fn test_multiple_subscribers() {
        let manager = StateManager::new();
        let mut rx1 = manager.subscribe();
        let mut rx2 = manager.subscribe();

        manager.set_inventory(inventory(1, 1));

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_clone_state_manager() {
        let manager1 = StateManager::new();
        let manager2 = manager1.clone();

        manager1.update(|state| {
            state.progress_percent = 10.0;
        });

        assert_eq!(manager2.snapshot().progress_percent, 10.0);
    }
}
