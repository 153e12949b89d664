use crate::models::config::{
    STATUS_INVALID_MODS, STATUS_INVALID_PENUMBRA, STATUS_NO_COLLECTIONS, STATUS_NO_MODS,
    STATUS_NO_SORT_ORDER, STATUS_OK,
};
use crate::models::{AuroraConfig, ConfigStatus, MAX_CONCURRENCY, PathConfig};
use crate::services::scanner::{COLLECTIONS_FOLDER, SORT_ORDER_FILE, read_sort_order};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use thiserror::Error;

/// Settings file name inside the configuration directory.
pub const CONFIG_FILE: &str = "aurora.yaml";

/// Prefix of environment variables overriding the settings file.
///
/// Nested keys are separated by `__`, e.g. `AURORA_MODS__PATH`.
pub const ENV_PREFIX: &str = "AURORA";

/// Errors that can occur while loading, saving or editing the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("Failed to load configuration: {0}")]
    Layering(#[from] config::ConfigError),

    #[error("Filter must not be empty")]
    EmptyFilter,

    #[error("Concurrency must be between 0 and {max}, got {0}", max = MAX_CONCURRENCY)]
    ConcurrencyOutOfRange(u32),
}

/// Configuration manager for the YAML settings file.
///
/// Loading layers the settings file and `AURORA_*` environment variables
/// through the `config` crate; saving always writes the plain file.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
    env_prefix: String,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory holding `aurora.yaml` and the `logs` folder
    ///
    /// # Returns
    /// A new ConfigManager instance; the directory is created if missing
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|source| ConfigError::Io {
                path: config_dir.clone(),
                source,
            })?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE),
            config_dir,
            env_prefix: ENV_PREFIX.to_string(),
        })
    }

    /// Use a different environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Platform configuration directory for Aurora (`<config dir>/aurora`).
    ///
    /// Falls back to the working directory when the platform has none.
    pub fn default_dir() -> Utf8PathBuf {
        dirs::config_dir()
            .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
            .map(|dir| dir.join("aurora"))
            .unwrap_or_else(|| Utf8PathBuf::from("."))
    }

    /// Load the configuration.
    ///
    /// A missing settings file is created with default values first. A stored
    /// concurrency above [`MAX_CONCURRENCY`] is rejected.
    pub fn load(&self) -> Result<AuroraConfig, ConfigError> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, creating defaults",
                self.config_path
            );
            self.save(&Self::default_config())?;
        }

        let config = config::Config::builder()
            .add_source(
                config::File::new(self.config_path.as_str(), config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<AuroraConfig>()?;
        check_concurrency(config.concurrency)?;

        tracing::info!(
            "Config loaded: penumbra={}, mods={}, {} filters, concurrency={}",
            config.penumbra.path,
            config.mods.path,
            config.filters.len(),
            config.concurrency
        );
        Ok(config)
    }

    /// Save the configuration file.
    ///
    /// # Arguments
    /// * `config` - The AuroraConfig to save
    pub fn save(&self, config: &AuroraConfig) -> Result<(), ConfigError> {
        let yaml_string = serde_yaml_ng::to_string(config)?;

        fs::write(&self.config_path, yaml_string).map_err(|source| ConfigError::Io {
            path: self.config_path.clone(),
            source,
        })?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Overwrite the settings file with defaults and return them.
    pub fn reset(&self) -> Result<AuroraConfig, ConfigError> {
        let config = Self::default_config();
        self.save(&config)?;
        tracing::info!("Config reset to defaults");
        Ok(config)
    }

    /// Defaults written for a new installation.
    pub fn default_config() -> AuroraConfig {
        AuroraConfig {
            penumbra: PathConfig::new(default_penumbra_path()),
            ..AuroraConfig::default()
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Get the settings file path.
    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    /// Directory for the rolling log files.
    pub fn log_dir(&self) -> Utf8PathBuf {
        self.config_dir.join("logs")
    }
}

/// Where XIVLauncher keeps Penumbra's configuration.
pub fn default_penumbra_path() -> Utf8PathBuf {
    dirs::config_dir()
        .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
        .unwrap_or_default()
        .join("XIVLauncher")
        .join("pluginConfigs")
        .join("Penumbra")
}

/// Check the configured paths.
///
/// The Penumbra path must be a directory with `sort_order.json` and a
/// `collections` folder. The mods path must be a directory, and once the
/// Penumbra path is valid it must contain at least one mod listed in
/// `sort_order.json`.
pub fn derive_status(config: &AuroraConfig) -> ConfigStatus {
    let penumbra = &config.penumbra.path;
    let mods = &config.mods.path;

    let penumbra_status = if !penumbra.is_dir() {
        tracing::warn!("Invalid Penumbra path: {}", penumbra);
        STATUS_INVALID_PENUMBRA
    } else if !penumbra.join(SORT_ORDER_FILE).is_file() {
        tracing::warn!("{} not found in {}", SORT_ORDER_FILE, penumbra);
        STATUS_NO_SORT_ORDER
    } else if !penumbra.join(COLLECTIONS_FOLDER).is_dir() {
        tracing::warn!("{} folder not found in {}", COLLECTIONS_FOLDER, penumbra);
        STATUS_NO_COLLECTIONS
    } else {
        STATUS_OK
    };

    let mods_status = if !mods.is_dir() {
        tracing::warn!("Invalid Mods path: {}", mods);
        STATUS_INVALID_MODS
    } else if penumbra_status == STATUS_OK && !has_matching_mod(penumbra, mods) {
        tracing::warn!("No mods from Penumbra found in Mods folder: {}", mods);
        STATUS_NO_MODS
    } else {
        STATUS_OK
    };

    let status = ConfigStatus::new(penumbra_status, mods_status);
    tracing::info!(
        "Config status: valid={}, penumbra={}, mods={}",
        status.valid,
        status.penumbra_status,
        status.mods_status
    );
    status
}

fn has_matching_mod(penumbra: &Utf8Path, mods: &Utf8Path) -> bool {
    match read_sort_order(penumbra) {
        Ok(names) => names.iter().any(|name| mods.join(name).is_dir()),
        Err(e) => {
            tracing::debug!("Could not read sort order: {}", e);
            false
        }
    }
}

/// Normalize a filter entered by the user.
pub fn normalize_filter(filter: &str) -> Result<String, ConfigError> {
    let filter = filter.trim();
    if filter.is_empty() {
        return Err(ConfigError::EmptyFilter);
    }
    Ok(filter.to_string())
}

/// Accept 0 (auto) through [`MAX_CONCURRENCY`].
pub fn check_concurrency(concurrency: u32) -> Result<u32, ConfigError> {
    if concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::ConcurrencyOutOfRange(concurrency));
    }
    Ok(concurrency)
}
