// Aurora - backup of the Penumbra mods your collections actually use
//
// This is the library crate containing the backup engine and data structures.
// The binary crate (main.rs) provides the command line entry point.

pub mod app;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use app::{Aurora, AuroraError};
pub use config::ConfigManager;
pub use models::{AppState, AuroraConfig, BackupProgress, BackupResult, BackupValidation, Inventory};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
