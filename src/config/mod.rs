//! Configuration management.
//!
//! The configuration file is TOML. Four tables, keyed by a shared join key,
//! describe the retention units:
//!
//! ```toml
//! [SearchPaths]
//! proj = "/srv/builds/proj"
//!
//! [MatchPatterns]
//! proj = "build-.*"
//!
//! [ExcludePatterns]
//! proj = "keep-.*"
//!
//! [KeepDurations]
//! proj = 5
//! ```
//!
//! The remaining sections tune the run (`[scan]`, `[delete]`) and the
//! process (`[observability]`).

mod join;

pub use join::{ConfigJoiner, JoinProblem, JoinTables, KeepDuration, Table};

use crate::gc::{DeletionPolicy, RunSettings, ScanErrorPolicy};
use crate::models::UnitConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "DIRCULL_CONFIG_PATH";

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// The four join tables.
    #[serde(flatten)]
    pub tables: JoinTables,
    /// Scan section.
    pub scan: Option<ConfigFileScan>,
    /// Delete section.
    pub delete: Option<ConfigFileDelete>,
    /// Observability section.
    pub observability: Option<ObservabilitySettings>,
}

/// Scan section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileScan {
    /// What to do with unreadable directories.
    pub on_error: Option<ScanErrorPolicy>,
}

/// Delete section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileDelete {
    /// What to do with entries that cannot be removed.
    pub on_error: Option<DeletionPolicy>,
}

/// Observability section in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ObservabilitySettings {
    /// Logging settings.
    pub logging: Option<LoggingSettings>,
    /// Metrics settings.
    pub metrics: Option<MetricsSettings>,
}

/// Logging settings in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive, e.g. `info` or `dircull=debug`.
    pub level: Option<String>,
    /// Append log lines to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Metrics settings in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetricsSettings {
    /// Whether metrics are recorded. Defaults to `true` when a textfile is set.
    pub enabled: Option<bool>,
    /// Prometheus textfile written at exit.
    pub textfile: Option<PathBuf>,
}

/// Main configuration for dircull.
#[derive(Debug, Default)]
pub struct DircullConfig {
    /// The four join tables as read.
    pub tables: JoinTables,
    /// Scan error policy for every unit.
    pub scan_policy: ScanErrorPolicy,
    /// Deletion failure policy for every unit.
    pub deletion_policy: DeletionPolicy,
    /// Observability settings.
    pub observability: ObservabilitySettings,
    /// The file the configuration was read from, if any.
    pub source: Option<PathBuf>,
}

impl DircullConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the text is not valid TOML or does
    /// not have the expected shape.
    pub fn parse(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|e| Error::InvalidInput(format!("cannot parse configuration: {e}")))?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidInput(format!("cannot read configuration {}: {e}", path.display()))
        })?;

        let mut config = Self::parse(&contents).map_err(|e| match e {
            Error::InvalidInput(cause) => Error::InvalidInput(format!("{}: {cause}", path.display())),
            other => other,
        })?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Loads configuration from the default location.
    ///
    /// A path in `DIRCULL_CONFIG_PATH` is loaded as is, even if it does not
    /// exist; otherwise the first existing file of [`config_sources`] is used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if no configuration file exists, or
    /// if the one found cannot be read or parsed.
    pub fn load_default() -> Result<Self> {
        if let Some(path) = env_config_path() {
            return Self::load_from_file(&path);
        }

        let path = config_sources()
            .into_iter()
            .find(|path| path.is_file())
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "no configuration: pass a path or set {CONFIG_PATH_ENV}"
                ))
            })?;
        Self::load_from_file(&path)
    }

    /// Loads `path` if given, otherwise the default location.
    ///
    /// # Errors
    ///
    /// See [`DircullConfig::load_from_file`] and
    /// [`DircullConfig::load_default`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(Self::load_default, Self::load_from_file)
    }

    /// Converts a `ConfigFile` to `DircullConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self {
            tables: file.tables,
            ..Self::default()
        };

        if let Some(policy) = file.scan.and_then(|scan| scan.on_error) {
            config.scan_policy = policy;
        }
        if let Some(policy) = file.delete.and_then(|delete| delete.on_error) {
            config.deletion_policy = policy;
        }
        if let Some(observability) = file.observability {
            config.observability = observability;
        }

        config
    }

    /// Joins the four tables into unit rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigJoin`] listing every problem found.
    pub fn join(&self) -> Result<Vec<UnitConfig>> {
        ConfigJoiner::join(&self.tables)
    }

    /// Returns the settings shared by every unit.
    #[must_use]
    pub const fn run_settings(&self) -> RunSettings {
        RunSettings {
            scan_policy: self.scan_policy,
            deletion_policy: self.deletion_policy,
        }
    }
}

/// Returns the configuration paths searched when `DIRCULL_CONFIG_PATH` is
/// unset, in lookup order.
///
/// Currently only the platform config dir: `~/.config/dircull/config.toml`
/// on Linux, `~/Library/Application Support/dircull/config.toml` on macOS.
#[must_use]
pub fn config_sources() -> Vec<PathBuf> {
    directories::BaseDirs::new()
        .map(|base_dirs| base_dirs.config_dir().join("dircull").join("config.toml"))
        .into_iter()
        .collect()
}

fn env_config_path() -> Option<PathBuf> {
    std::env::var_os(CONFIG_PATH_ENV)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}
