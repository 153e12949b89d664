//! Services module - the backup engine.
//!
//! Everything between "what is on disk" and "a finished archive" lives here.
//! The services have no dependency on the CLI or on [`StateManager`](crate::state::StateManager),
//! which keeps them testable in isolation.
//!
//! # Components
//!
//! - [`scanner`]: reads Penumbra's `sort_order.json` and collection files behind the
//!   [`ModSource`] trait
//! - [`inventory`]: normalizes a scan into an [`Inventory`](crate::models::Inventory)
//!   with deduplicated mods and aggregate stats
//! - [`filter`]: case-insensitive substring matching of filters against mod and collection names
//! - [`planner`]: turns an inventory and the filter list into a
//!   [`BackupValidation`](crate::models::BackupValidation), plus the disk-space check
//! - [`executor`]: the concurrent zip pipeline with cancellation and cleanup
//! - [`progress`]: the ordered, single-terminal progress channel between a run and its observer
//!
//! # Data flow
//!
//! ```text
//! ModSource::scan -> inventory::build -> planner::validate -> BackupExecutor::start
//!                                                              |
//!                                                              +-> ProgressStream
//! ```
//!
//! # Usage Example
//!
//! ```ignore
//! use aurora::services::{BackupExecutor, ModSource, PenumbraSource, inventory, planner};
//!
//! let scan = PenumbraSource.scan(&config)?;
//! let inventory = inventory::build(scan.mods, scan.collections);
//! let plan = planner::validate(&inventory, &config.filters);
//!
//! let mut run = executor.start(&plan, config.concurrency)?;
//! while let Some(event) = run.progress().next().await {
//!     println!("{:.1}% {}", event.percent, event.current);
//! }
//! let result = run.wait().await?;
//! ```

pub mod executor;
pub mod filter;
pub mod inventory;
pub mod planner;
pub mod progress;
pub mod scanner;

pub use executor::{
    ArchiveSettings, BackupError, BackupExecutor, BackupRun, CancelHandle, RunHandle, RunObserver,
    RunPhase,
};
pub use progress::{ProgressSender, ProgressStream, progress_channel};
pub use scanner::{ModSource, PenumbraSource, RawCollection, RawMod, RawScan, ScanError};
