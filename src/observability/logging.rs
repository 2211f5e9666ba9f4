//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, falling back to [`LogFormat::Pretty`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive.
    pub filter: String,
    /// Append to this file instead of writing to stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: "info".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    ///
    /// The filter comes from the first of: `RUST_LOG`, `--verbose`,
    /// `DIRCULL_LOG_LEVEL`, the config file, `info`.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        let mut config = Self::default();

        if let Some(settings) = settings {
            if let Some(format) = settings.format.as_deref() {
                config.format = LogFormat::parse(format);
            }
            if let Some(level) = settings.level.as_deref().filter(|l| !l.trim().is_empty()) {
                config.filter = level.to_string();
            }
            config.file.clone_from(&settings.file);
        }

        if let Some(format) = parse_string_env("DIRCULL_LOG_FORMAT") {
            config.format = LogFormat::parse(&format);
        }
        if let Some(file) = parse_string_env("DIRCULL_LOG_FILE") {
            config.file = Some(PathBuf::from(file));
        }
        if let Some(level) = parse_string_env("DIRCULL_LOG_LEVEL") {
            config.filter = level;
        }
        if verbose {
            config.filter = "debug".to_string();
        }
        if let Some(filter) = parse_string_env("RUST_LOG") {
            config.filter = filter;
        }

        config
    }
}

fn parse_string_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
