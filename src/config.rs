//! Configuration management for Ratewarden.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, WardenError};
use crate::metrics::StatsdConfig;

/// Prefix for environment overrides, e.g. `RATEWARDEN__LIMITER__LIMIT=20`.
const ENV_PREFIX: &str = "RATEWARDEN";

/// Main configuration for Ratewarden.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Rate limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// StatsD emission; disabled when absent
    #[serde(default)]
    pub metrics: Option<StatsdConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum events per key inside the window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Interval between background sweeps in milliseconds
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_ms: default_window_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl LimiterConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

fn default_limit() -> u64 {
    100
}

fn default_window_ms() -> u64 {
    10_000
}

fn default_sweep_interval_ms() -> u64 {
    1_000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl WardenConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WardenConfig = serde_yaml::from_str(yaml)
            .map_err(|e| WardenError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file, then apply
    /// `RATEWARDEN__SECTION__FIELD` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(::config::File::from(path));
        }

        let config: WardenConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| WardenError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.window_ms == 0 {
            return Err(WardenError::Config("limiter.window_ms must be greater than 0".to_string()));
        }
        if self.limiter.sweep_interval_ms == 0 {
            return Err(WardenError::Config(
                "limiter.sweep_interval_ms must be greater than 0".to_string(),
            ));
        }
        if let Some(metrics) = &self.metrics {
            if metrics.batch_size == 0 {
                return Err(WardenError::Config("metrics.batch_size must be greater than 0".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = WardenConfig::default();
        assert_eq!(config.limiter.limit, 100);
        assert_eq!(config.limiter.window(), Duration::from_secs(10));
        assert_eq!(config.limiter.sweep_interval(), Duration::from_secs(1));
        assert!(config.metrics.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
limiter:
  limit: 3
  window_ms: 1000
metrics:
  addr: 127.0.0.1:9125
logging:
  json: true
"#;
        let config = WardenConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.limit, 3);
        assert_eq!(config.limiter.window(), Duration::from_secs(1));
        assert_eq!(config.limiter.sweep_interval_ms, 1_000);

        let metrics = config.metrics.unwrap();
        assert_eq!(metrics.addr, "127.0.0.1:9125");
        assert_eq!(metrics.name, "ratewarden");
        assert!(config.logging.json);
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let err = WardenConfig::from_yaml("limiter:\n  window_ms: 0\n").unwrap_err();
        assert!(matches!(err, WardenError::Config(_)));

        let err = WardenConfig::from_yaml("limiter:\n  sweep_interval_ms: 0\n").unwrap_err();
        assert!(matches!(err, WardenError::Config(_)));
    }

    #[test]
    fn test_from_yaml_invalid() {
        let err = WardenConfig::from_yaml("limiter: [1, 2").unwrap_err();
        assert!(matches!(err, WardenError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("ratewarden-config-{}.yaml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "limiter:\n  limit: 7\n  window_ms: 500").unwrap();
        drop(file);

        let loaded = WardenConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(loaded.limiter.limit, 7);
        assert_eq!(loaded.limiter.window_ms, 500);

        let parsed = WardenConfig::from_file(&path).unwrap();
        assert_eq!(parsed.limiter.limit, 7);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_from_file_missing() {
        let err = WardenConfig::from_file("/nonexistent/ratewarden.yaml").unwrap_err();
        assert!(matches!(err, WardenError::Io(_)));
    }
}
