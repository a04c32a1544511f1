//! Runtime configuration: defaults -> optional file -> `ETA__*` environment.
//!
//! The result is a plain value handed to constructors; nothing is cached
//! process-wide.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use eta_resilience::RetryConfig;

use crate::promotion::EngineConfig;

pub const ENV_PREFIX: &str = "ETA";
pub const CONFIG_FILE_ENV: &str = "ETA_CONFIG_FILE";

#[derive(Debug, Deserialize, Clone)]
pub struct PromotionConfig {
    /// MLflow tracking server root.
    pub tracking_uri: String,
    pub model_name: String,
    /// Local path or `http(s)://` URL of the held-out CSV.
    pub dataset: String,
    /// Base directory for relative local artifact locations.
    pub artifact_root: PathBuf,
    pub metric_precision: u32,
    pub registry_timeout_ms: u64,
    pub artifact_timeout_ms: u64,
    pub retry_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub endpoint_url: Option<String>,
    pub log_level: String,
    pub json_log: bool,
}

impl PromotionConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            metric_precision: self.metric_precision,
            registry_timeout: Duration::from_millis(self.registry_timeout_ms),
            artifact_timeout: Duration::from_millis(self.artifact_timeout_ms),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            ..RetryConfig::default()
        }
    }

    pub fn registry_timeout(&self) -> Duration { Duration::from_millis(self.registry_timeout_ms) }
    pub fn artifact_timeout(&self) -> Duration { Duration::from_millis(self.artifact_timeout_ms) }
}

fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
    Ok(config::Config::builder()
        .set_default("tracking_uri", "http://127.0.0.1:5000")?
        .set_default("model_name", "delivery-eta-model")?
        .set_default("dataset", "data/processed_data.csv")?
        .set_default("artifact_root", ".")?
        .set_default("metric_precision", 6)?
        .set_default("registry_timeout_ms", 10_000)?
        .set_default("artifact_timeout_ms", 60_000)?
        .set_default("retry_attempts", 3)?
        .set_default("retry_base_delay_ms", 500)?
        .set_default("retry_max_delay_ms", 10_000)?
        .set_default("log_level", "info")?
        .set_default("json_log", false)?)
}

/// Load configuration. `file` wins over `ETA_CONFIG_FILE`; the file format is
/// taken from its extension (yaml, toml, json).
pub fn load_config(file: Option<&Path>) -> Result<PromotionConfig> {
    let mut b = builder()?;
    let from_env = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
    if let Some(path) = file.map(Path::to_path_buf).or(from_env) {
        b = b.add_source(config::File::from(path.as_path()).required(true));
    }
    b = b.add_source(config::Environment::with_prefix(ENV_PREFIX).prefix_separator("__").separator("__").try_parsing(true));
    let cfg = b.build().context("building configuration")?;
    let out: PromotionConfig = cfg.try_deserialize().context("invalid configuration")?;
    if out.metric_precision > 15 {
        anyhow::bail!("metric_precision must be at most 15, got {}", out.metric_precision);
    }
    Ok(out)
}

/// Parse configuration from an in-memory YAML document layered over the defaults.
pub fn from_yaml_str(text: &str) -> Result<PromotionConfig> {
    let cfg = builder()?
        .add_source(config::File::from_str(text, config::FileFormat::Yaml))
        .build()?;
    Ok(cfg.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_keys() {
        let cfg = from_yaml_str("model_name: eta-test\n").unwrap();
        assert_eq!(cfg.model_name, "eta-test");
        assert_eq!(cfg.metric_precision, 6);
        assert_eq!(cfg.engine_config().registry_timeout, Duration::from_secs(10));
        assert!(cfg.endpoint_url.is_none());
        assert!(!cfg.json_log);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("promotion.yaml");
        std::fs::write(
            &path,
            "tracking_uri: http://mlflow:32001/\nartifact_timeout_ms: 1500\nretry_attempts: 5\nendpoint_url: http://endpoint/invocations\n",
        )
        .unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.tracking_uri, "http://mlflow:32001/");
        assert_eq!(cfg.artifact_timeout(), Duration::from_millis(1500));
        assert_eq!(cfg.retry_config().max_attempts, 5);
        assert_eq!(cfg.endpoint_url.as_deref(), Some("http://endpoint/invocations"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/promotion.yaml"))).is_err());
    }
}
