//! Prometheus metrics.
//!
//! The recorder is installed without an HTTP listener. At exit the rendered
//! metrics are written to a textfile for the node_exporter textfile
//! collector: first to a temporary sibling, then renamed over the target so
//! the collector never reads a partial file.

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fs;
use std::path::{Path, PathBuf};

/// Metrics configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether metrics are recorded.
    pub enabled: bool,
    /// Where to write the rendered metrics at exit.
    pub textfile: Option<PathBuf>,
}

impl MetricsConfig {
    /// Builds metrics configuration from config settings with env overrides.
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        let textfile = settings.and_then(|config| config.textfile.clone());
        let enabled = settings
            .and_then(|config| config.enabled)
            .unwrap_or(textfile.is_some());

        let mut config = Self { enabled, textfile };

        if let Some(textfile) = parse_path_env("DIRCULL_METRICS_TEXTFILE") {
            config.textfile = Some(textfile);
            config.enabled = true;
        }
        if let Some(enabled) = parse_bool_env("DIRCULL_METRICS_ENABLED") {
            config.enabled = enabled;
        }

        config
    }
}

/// Metrics handle for flushing on shutdown.
#[derive(Debug)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
    textfile: Option<PathBuf>,
}

/// Installs the Prometheus metrics recorder.
///
/// Returns `None` when metrics are disabled.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_recorder_install".to_string(),
            cause: e.to_string(),
        })?;

    Ok(Some(MetricsHandle {
        prometheus,
        textfile: config.textfile.clone(),
    }))
}

/// Writes the current metrics to the configured textfile, if any.
pub fn flush(handle: &MetricsHandle) {
    let Some(textfile) = &handle.textfile else {
        tracing::debug!("No metrics textfile configured, skipping flush");
        return;
    };

    let payload = handle.prometheus.render();
    match write_textfile(textfile, &payload) {
        Ok(()) => tracing::debug!(
            bytes = payload.len(),
            path = %textfile.display(),
            "Wrote metrics textfile"
        ),
        Err(e) => tracing::warn!(error = %e, "Failed to write metrics textfile"),
    }
}

/// Atomically replaces `path` with `payload`.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be written or renamed.
pub fn write_textfile(path: &Path, payload: &str) -> Result<()> {
    let failure = |operation: &str, e: std::io::Error| Error::OperationFailed {
        operation: operation.to_string(),
        cause: format!("{}: {e}", path.display()),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| failure("create_metrics_dir", e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.tmp", std::process::id()));
    let tmp = PathBuf::from(tmp);

    let mut contents = payload.to_string();
    if !contents.ends_with('\n') {
        contents.push('\n');
    }

    fs::write(&tmp, contents).map_err(|e| failure("write_metrics_textfile", e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        failure("rename_metrics_textfile", e)
    })
}

fn parse_bool_env(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|value| {
        let value = value.to_lowercase();
        value == "true" || value == "1" || value == "yes"
    })
}

fn parse_path_env(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_textfile_enables_metrics() {
        let settings = MetricsSettings {
            enabled: None,
            textfile: Some(PathBuf::from("/var/lib/node_exporter/dircull.prom")),
        };
        let config = MetricsConfig::from_settings(Some(&settings));
        if std::env::var_os("DIRCULL_METRICS_ENABLED").is_none() {
            assert!(config.enabled);
        }
    }

    #[test]
    fn test_disabled_without_settings() {
        if std::env::var_os("DIRCULL_METRICS_ENABLED").is_none()
            && std::env::var_os("DIRCULL_METRICS_TEXTFILE").is_none()
        {
            assert_eq!(MetricsConfig::from_settings(None), MetricsConfig::default());
        }
    }

    #[test]
    fn test_write_textfile_replaces_atomically() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested/dircull.prom");

        write_textfile(&path, "dircull_units_total 1").expect("first write");
        write_textfile(&path, "dircull_units_total 2\n").expect("second write");

        let contents = fs::read_to_string(&path).expect("read textfile");
        assert_eq!(contents, "dircull_units_total 2\n");

        let leftovers: Vec<_> = fs::read_dir(path.parent().expect("parent"))
            .expect("list dir")
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
