//! Configuration types for viewbuf

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, ViewbufError};

/// Reconciliation timing and scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcileConfig {
    /// Delay between reconciliation passes
    pub period_ms: u64,

    /// Bound on every store call inside a pass
    pub key_timeout_ms: u64,

    /// Entity kinds to drain; empty means every key in the buffer
    pub entity_kinds: Vec<String>,

    /// Metric fields to drain
    pub metrics: Vec<String>,

    /// Run one last pass when the scheduler stops
    pub drain_on_shutdown: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            period_ms: 180_000,
            key_timeout_ms: 5_000,
            entity_kinds: vec!["post".to_string()],
            metrics: vec!["views".to_string()],
            drain_on_shutdown: true,
        }
    }
}

impl ReconcileConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn key_timeout(&self) -> Duration {
        Duration::from_millis(self.key_timeout_ms)
    }
}

/// Top-level viewbuf configuration (viewbuf.yaml / viewbuf.json)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewbufConfig {
    pub reconcile: ReconcileConfig,

    /// JSON file backing the durable counter store; in-memory when unset
    pub durable_store_path: Option<PathBuf>,

    /// Fallback tracing filter when RUST_LOG is not set
    pub log_filter: String,
}

impl Default for ViewbufConfig {
    fn default() -> Self {
        Self {
            reconcile: ReconcileConfig::default(),
            durable_store_path: None,
            log_filter: "info".to_string(),
        }
    }
}

impl ViewbufConfig {
    /// Load configuration from a YAML (`.yaml`/`.yml`) or JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );

        let config: Self = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.reconcile.period_ms == 0 {
            return Err(ViewbufError::Config(
                "reconcile.periodMs must be greater than zero".to_string(),
            ));
        }
        if self.reconcile.key_timeout_ms == 0 {
            return Err(ViewbufError::Config(
                "reconcile.keyTimeoutMs must be greater than zero".to_string(),
            ));
        }
        if self.reconcile.metrics.is_empty() {
            return Err(ViewbufError::Config(
                "reconcile.metrics must name at least one metric".to_string(),
            ));
        }
        if let Some(bad) = self
            .reconcile
            .entity_kinds
            .iter()
            .chain(self.reconcile.metrics.iter())
            .find(|name| name.is_empty() || name.contains("::"))
        {
            return Err(ViewbufError::Config(format!(
                "'{}' is not a valid entity kind or metric name",
                bad
            )));
        }
        Ok(())
    }
}
