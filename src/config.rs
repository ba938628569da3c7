//! Loads a [`LogConfig`] from TOML plus environment overrides (§12).
//!
//! §3.3 only defines the `LogConfig` struct itself; this module is the
//! ambient loading path around it, built on the `config` crate over TOML
//! plus environment layers.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::ring_store::LogConfig;

/// Wire representation of [`LogConfig`] for deserialization. All fields are
/// optional so a partial TOML file or partial environment override can layer
/// on top of defaults; `max_bytes` has no safe default and must resolve to
/// `Some` by the time [`LogConfigSource::load`] returns.
#[derive(Debug, Default, Deserialize)]
struct RawLogConfig {
    max_bytes: Option<i32>,
    format_version: Option<i32>,
    dedup_enabled: Option<bool>,
}

/// Builds a [`LogConfig`] from an optional TOML file and `KLOG_`-prefixed
/// environment variables (e.g. `KLOG_MAX_BYTES=1048576`), layered over
/// built-in defaults.
#[derive(Debug, Default, Clone)]
pub struct LogConfigSource {
    file_path: Option<String>,
}

impl LogConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a TOML file as the base layer. Missing files are tolerated
    /// (treated as an empty layer) so embedding apps can ship a config file
    /// optionally.
    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Loads and validates the final [`LogConfig`]. Environment variables
    /// (prefix `KLOG_`, e.g. `KLOG_MAX_BYTES`) take precedence over the file,
    /// which takes precedence over defaults (`format_version = 1`,
    /// `dedup_enabled = true`).
    pub fn load(&self) -> Result<LogConfig> {
        let mut builder = config::Config::builder();
        if let Some(path) = &self.file_path {
            builder = builder.add_source(
                config::File::with_name(path).required(false),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix("KLOG").separator("_"),
        );

        let raw: RawLogConfig = builder
            .build()
            .map_err(|e| Error::Configuration(e.to_string()))?
            .try_deserialize()
            .map_err(|e| Error::Configuration(e.to_string()))?;

        let max_bytes = raw
            .max_bytes
            .ok_or_else(|| Error::Configuration("max_bytes must be set (file or KLOG_MAX_BYTES)".into()))?;

        let config = LogConfig {
            max_bytes,
            format_version: raw.format_version.unwrap_or(1),
            dedup_enabled: raw.dedup_enabled.unwrap_or(true),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `KLOG_*` environment variables are process-global; serialize the tests
    // that touch them so they don't interfere with each other under the
    // default parallel test runner.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_max_bytes_is_a_configuration_error() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let err = LogConfigSource::new().load().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn env_override_supplies_max_bytes() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("KLOG_MAX_BYTES", "65536");
        let result = LogConfigSource::new().load();
        std::env::remove_var("KLOG_MAX_BYTES");

        let config = result.unwrap();
        assert_eq!(config.max_bytes, 65536);
        assert_eq!(config.format_version, 1);
        assert!(config.dedup_enabled);
    }

    #[test]
    fn env_override_rejects_too_small_max_bytes() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("KLOG_MAX_BYTES", "4");
        let err = LogConfigSource::new().load().unwrap_err();
        std::env::remove_var("KLOG_MAX_BYTES");
        assert!(matches!(err, Error::Configuration(_)));
    }
}
