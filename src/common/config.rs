//! YAML-backed configuration: metric definitions, anomaly detector settings,
//! and storage defaults.
//!
//! Grounded on `original_source/loglens/utils/config.py`: same shape
//! (`metrics[]`, `anomalies[]`, `storage`, `default_source`, `default_level`)
//! and the same defaults. The Python original compiles `filter`/`group_by`/
//! `value_extractor` expressions with `eval()` against a restricted
//! namespace; this crate instead evaluates them with the small hand-written
//! interpreter in [`crate::cli::expr`], deliberately narrower in scope (see
//! DESIGN.md).

use crate::cli::expr;
use crate::error::{LogLensError, Result};
use crate::models::metric::{AggregationKind, MetricDef};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One metric definition as written in YAML.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricConfig {
    pub name: String,
    #[serde(default = "default_filter")]
    pub filter: String,
    pub aggregation: String,
    #[serde(default)]
    pub percentile: Option<f64>,
    pub window: String,
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub value_extractor: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_filter() -> String {
    "true".to_string()
}

/// Anomaly detector settings for one metric.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnomalyConfig {
    pub metric_name: String,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_window_size() -> usize {
    20
}
fn default_threshold() -> f64 {
    2.0
}
fn default_min_samples() -> usize {
    5
}
fn default_enabled() -> bool {
    true
}

/// Storage file location and retention.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub retention_days: Option<u32>,
}

fn default_db_path() -> String {
    "loglens.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            retention_days: None,
        }
    }
}

/// Top-level LogLens++ configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogLensConfig {
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
    #[serde(default)]
    pub anomalies: Vec<AnomalyConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default = "default_source")]
    pub default_source: String,
    #[serde(default = "default_level")]
    pub default_level: String,
}

fn default_source() -> String {
    "unknown".to_string()
}
fn default_level() -> String {
    "INFO".to_string()
}

impl Default for LogLensConfig {
    fn default() -> Self {
        Self {
            metrics: Vec::new(),
            anomalies: Vec::new(),
            storage: StorageConfig::default(),
            default_source: default_source(),
            default_level: default_level(),
        }
    }
}

const DISCOVERY_CANDIDATES: &[&str] = &["loglens.yaml", "loglens.yml", ".loglens.yaml"];

impl LogLensConfig {
    /// Load from an explicit path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Search, in order: `loglens.yaml`, `loglens.yml`, `.loglens.yaml` in the
    /// current directory, then `~/.loglens.yaml`. Falls back to defaults if
    /// none are found.
    pub fn discover() -> Result<Self> {
        for candidate in DISCOVERY_CANDIDATES {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Self::from_file(path);
            }
        }
        if let Some(home) = dirs::home_dir() {
            let path = home.join(".loglens.yaml");
            if path.exists() {
                return Self::from_file(path);
            }
        }
        Ok(Self::default())
    }

    /// Compile this config's metric definitions into runtime [`MetricDef`]s.
    pub fn to_metrics(&self) -> Result<Vec<MetricDef>> {
        self.metrics.iter().map(metric_config_to_def).collect()
    }

    /// Find this metric's anomaly settings, if configured and enabled.
    pub fn anomaly_config_for(&self, metric_name: &str) -> Option<&AnomalyConfig> {
        self.anomalies.iter().find(|a| a.metric_name == metric_name && a.enabled)
    }

    /// The default four-metric, two-detector sample configuration.
    pub fn sample() -> Self {
        Self {
            metrics: vec![
                MetricConfig {
                    name: "error_count".to_string(),
                    filter: "event.level == \"ERROR\"".to_string(),
                    aggregation: "count".to_string(),
                    percentile: None,
                    window: "5m".to_string(),
                    group_by: None,
                    value_extractor: None,
                    description: Some("Count of ERROR-level events in a 5 minute window".to_string()),
                },
                MetricConfig {
                    name: "warning_count".to_string(),
                    filter: "event.level == \"WARNING\"".to_string(),
                    aggregation: "count".to_string(),
                    percentile: None,
                    window: "5m".to_string(),
                    group_by: None,
                    value_extractor: None,
                    description: Some("Count of WARNING-level events in a 5 minute window".to_string()),
                },
                MetricConfig {
                    name: "events_by_source".to_string(),
                    filter: "true".to_string(),
                    aggregation: "count".to_string(),
                    percentile: None,
                    window: "5m".to_string(),
                    group_by: Some("event.source".to_string()),
                    value_extractor: None,
                    description: Some("Event counts grouped by source".to_string()),
                },
                MetricConfig {
                    name: "events_by_level".to_string(),
                    filter: "true".to_string(),
                    aggregation: "count".to_string(),
                    percentile: None,
                    window: "5m".to_string(),
                    group_by: Some("event.level".to_string()),
                    value_extractor: None,
                    description: Some("Event counts grouped by level".to_string()),
                },
            ],
            anomalies: vec![
                AnomalyConfig {
                    metric_name: "error_count".to_string(),
                    window_size: 20,
                    threshold: 2.0,
                    min_samples: 5,
                    enabled: true,
                },
                AnomalyConfig {
                    metric_name: "warning_count".to_string(),
                    window_size: 20,
                    threshold: 2.0,
                    min_samples: 5,
                    enabled: true,
                },
            ],
            storage: StorageConfig::default(),
            default_source: default_source(),
            default_level: default_level(),
        }
    }

    /// Write the sample configuration as YAML to `path`.
    pub fn write_default(path: impl AsRef<Path>) -> Result<()> {
        let yaml = serde_yaml::to_string(&Self::sample())?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

fn metric_config_to_def(config: &MetricConfig) -> Result<MetricDef> {
    let filter_expr = expr::parse(&config.filter)
        .map_err(|e| LogLensError::InvalidMetric(format!("metric '{}': bad filter expression: {e}", config.name)))?;
    let predicate = expr::compile_predicate(filter_expr);

    let aggregation = AggregationKind::parse(&config.aggregation, config.percentile)?;

    let group_key = config
        .group_by
        .as_deref()
        .map(expr::parse)
        .transpose()
        .map_err(|e| LogLensError::InvalidMetric(format!("metric '{}': bad group_by expression: {e}", config.name)))?
        .map(expr::compile_group_key);

    let value_extractor = config
        .value_extractor
        .as_deref()
        .map(expr::parse)
        .transpose()
        .map_err(|e| {
            LogLensError::InvalidMetric(format!("metric '{}': bad value_extractor expression: {e}", config.name))
        })?
        .map(expr::compile_value_extractor);

    MetricDef::from_window_str(
        config.name.clone(),
        predicate,
        aggregation,
        &config.window,
        config.description.clone(),
        group_key,
        value_extractor,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_round_trips_through_yaml() {
        let yaml = serde_yaml::to_string(&LogLensConfig::sample()).unwrap();
        let parsed = LogLensConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed.metrics.len(), 4);
        assert_eq!(parsed.anomalies.len(), 2);
    }

    #[test]
    fn missing_optional_fields_use_documented_defaults() {
        let yaml = "metrics: []\n";
        let config = LogLensConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.default_source, "unknown");
        assert_eq!(config.default_level, "INFO");
        assert_eq!(config.storage.db_path, "loglens.db");
    }

    #[test]
    fn sample_metrics_compile_into_runtime_defs() {
        let defs = LogLensConfig::sample().to_metrics().unwrap();
        assert_eq!(defs.len(), 4);
    }
}
