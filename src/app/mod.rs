//! Application facade.
//!
//! [`Aurora`] wires the configuration, the scan source, the planner and the
//! executor together and exposes one method per boundary operation. Front
//! ends (the CLI in `main.rs`) talk only to this type.

pub mod dialog;

pub use dialog::browse_directory;

use crate::config::{self, ConfigError, ConfigManager};
use crate::metrics::Metrics;
use crate::models::{AuroraConfig, BackupValidation, ConfigResult, Inventory, format_size};
use crate::services::executor::{ArchiveSettings, BackupError, BackupExecutor, BackupRun};
use crate::services::scanner::{ModSource, PenumbraSource, ScanError};
use crate::services::{inventory, planner};
use crate::state::{StateChange, StateManager};
use camino::Utf8PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors reported by the facade operations
#[derive(Error, Debug)]
pub enum AuroraError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to scan Penumbra data: {0}")]
    Scan(#[source] ScanError),

    #[error("Cannot validate the backup without an inventory: {0}")]
    Validation(#[source] ScanError),

    #[error(transparent)]
    Backup(#[from] BackupError),
}

/// The backup engine behind a single handle.
///
/// Every configuration mutation is written to disk before the method
/// returns, so the next [`get_config`](Self::get_config) observes it.
pub struct Aurora {
    config_manager: ConfigManager,
    state: StateManager,
    source: Arc<dyn ModSource>,
    executor: BackupExecutor,
    metrics: Arc<Metrics>,
}

impl Aurora {
    /// Open the engine on a Penumbra install described by the settings file.
    pub fn open(config_manager: ConfigManager) -> Result<Self, AuroraError> {
        Self::with_source(config_manager, Arc::new(PenumbraSource))
    }

    /// Open the engine with a custom scan source.
    ///
    /// # Arguments
    /// * `config_manager` - Settings file location
    /// * `source` - Where mods and collections are read from
    pub fn with_source(
        config_manager: ConfigManager,
        source: Arc<dyn ModSource>,
    ) -> Result<Self, AuroraError> {
        let config = config_manager.load()?;
        let status = config::derive_status(&config);

        let state = StateManager::new();
        let metrics = Arc::new(Metrics::new());
        let executor = BackupExecutor::new(ArchiveSettings::from_config(&config), Arc::clone(&metrics))
            .with_observer(Arc::new(state.clone()));

        state.apply_config(config, status);

        Ok(Self {
            config_manager,
            state,
            source,
            executor,
            metrics,
        })
    }

    /// Current paths, filters, concurrency and path validity.
    pub fn get_config(&self) -> ConfigResult {
        self.state
            .read(|s| ConfigResult::new(&s.config, s.status.clone()))
    }

    /// Change the Penumbra and/or mods path; `None` keeps the current value.
    ///
    /// The validity status is derived again from the new paths.
    pub fn update_config(
        &self,
        penumbra_path: Option<Utf8PathBuf>,
        mods_path: Option<Utf8PathBuf>,
    ) -> Result<ConfigResult, AuroraError> {
        self.mutate_config(|config| {
            if let Some(path) = penumbra_path {
                config.penumbra.path = path;
            }
            if let Some(path) = mods_path {
                config.mods.path = path;
            }
            Ok(())
        })?;
        Ok(self.get_config())
    }

    /// Append a filter. Adding a filter that is already present does nothing.
    ///
    /// # Returns
    /// The filter list after the change
    pub fn add_filter(&self, filter: &str) -> Result<Vec<String>, AuroraError> {
        let filter = config::normalize_filter(filter)?;
        self.mutate_config(|config| {
            if config.has_filter(&filter) {
                tracing::debug!("Filter '{}' already present", filter);
            } else {
                config.filters.push(filter);
            }
            Ok(())
        })?;
        Ok(self.state.read(|s| s.config.filters.clone()))
    }

    /// Remove a filter. Removing an unknown filter does nothing.
    ///
    /// # Returns
    /// The filter list after the change
    pub fn remove_filter(&self, filter: &str) -> Result<Vec<String>, AuroraError> {
        let filter = filter.trim();
        self.mutate_config(|config| {
            config.filters.retain(|f| f != filter);
            Ok(())
        })?;
        Ok(self.state.read(|s| s.config.filters.clone()))
    }

    /// Set the default worker count (0 = all available cores).
    pub fn set_concurrency(&self, concurrency: u32) -> Result<(), AuroraError> {
        let concurrency = config::check_concurrency(concurrency)?;
        self.mutate_config(|config| {
            config.concurrency = concurrency;
            Ok(())
        })
    }

    /// Overwrite the settings file with defaults.
    pub fn reset_config(&self) -> Result<ConfigResult, AuroraError> {
        let config = self.config_manager.reset()?;
        let status = config::derive_status(&config);
        self.state.apply_config(config, status);
        Ok(self.get_config())
    }

    /// Scan the configured Penumbra install and rebuild the inventory.
    ///
    /// A failed scan leaves no inventory behind rather than an empty one.
    pub fn get_collections(&self) -> Result<Arc<Inventory>, AuroraError> {
        self.rebuild_inventory().map_err(AuroraError::Scan)
    }

    /// Compute the backup plan for the current inventory and filters.
    ///
    /// Scans first when no inventory has been built yet.
    pub fn validate_backup(&self) -> Result<Arc<BackupValidation>, AuroraError> {
        let inventory = match self.state.read(|s| s.inventory.clone()) {
            Some(inventory) => inventory,
            None => self.rebuild_inventory().map_err(AuroraError::Validation)?,
        };

        let config = self.state.read(|s| s.config.clone());
        let plan = planner::validate(&inventory, &config.filters);
        let plan = Arc::new(planner::with_space_check(plan, &config.output_dir));

        self.metrics.record_validation();
        self.state.set_validation(Arc::clone(&plan));

        tracing::info!(
            "Backup plan: {} of {} mods, estimated {}",
            plan.included_count(),
            plan.items.len(),
            plan.estimated_size_human
        );
        Ok(plan)
    }

    /// Start a backup of the current plan.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Arguments
    /// * `concurrency` - Worker count for this run; `None` uses the configured value
    ///
    /// # Errors
    /// * [`BackupError::Busy`] while another run is in progress
    /// * [`BackupError::InsufficientSpace`] when the output volume is too small
    /// * [`BackupError::NothingToBackup`] when every used mod is filtered out
    pub fn run_backup(&self, concurrency: Option<u32>) -> Result<BackupRun, AuroraError> {
        if self.executor.is_running() {
            return Err(BackupError::Busy.into());
        }

        let concurrency = match concurrency {
            Some(n) => n,
            None => self.state.read(|s| s.config.concurrency),
        };
        let concurrency = config::check_concurrency(concurrency)?;

        let plan = self.validate_backup()?;
        if let Some(space) = plan.space
            && !space.has_enough_space
        {
            tracing::error!(
                "Not enough space for backup: {} required, {} available",
                space.required,
                space.available
            );
            return Err(BackupError::InsufficientSpace {
                required: format_size(space.required),
                available: format_size(space.available),
            }
            .into());
        }

        let mut executor = self.executor.clone();
        executor.set_settings(self.state.read(|s| ArchiveSettings::from_config(&s.config)));

        Ok(executor.start(&plan, concurrency)?)
    }

    pub fn is_backing_up(&self) -> bool {
        self.executor.is_running()
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state.subscribe()
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn config_manager(&self) -> &ConfigManager {
        &self.config_manager
    }

    /// Apply a change to a copy of the config, persist it, then publish it.
    fn mutate_config<F>(&self, f: F) -> Result<(), AuroraError>
    where
        F: FnOnce(&mut AuroraConfig) -> Result<(), AuroraError>,
    {
        let (current, status) = self.state.read(|s| (s.config.clone(), s.status.clone()));
        let mut next = current.clone();
        f(&mut next)?;

        if next == current {
            return Ok(());
        }

        self.config_manager.save(&next)?;

        let status = if next.penumbra != current.penumbra || next.mods != current.mods {
            config::derive_status(&next)
        } else {
            status
        };
        self.state.apply_config(next, status);
        Ok(())
    }

    fn rebuild_inventory(&self) -> Result<Arc<Inventory>, ScanError> {
        let config = self.state.read(|s| s.config.clone());
        let scan = self.source.scan(&config)?;
        self.metrics.record_scan();

        let inventory = Arc::new(inventory::build(scan.mods, scan.collections));
        self.state.set_inventory(Arc::clone(&inventory));
        Ok(inventory)
    }
}
