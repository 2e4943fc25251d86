//! ReconcileScope - Which buffered counters a reconciliation pass owns

use super::counter_key::BufferKey;

/// The metric every content read bumps
pub const VIEWS_METRIC: &str = "views";

/// Entity kind reconciled when nothing else is configured
pub const DEFAULT_ENTITY_KIND: &str = "post";

/// Scope of a reconciliation pass
///
/// An empty `entity_kinds` list means "every outer key in the buffer".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileScope {
    entity_kinds: Vec<String>,
    metrics: Vec<String>,
}

impl ReconcileScope {
    pub fn new(entity_kinds: Vec<String>, metrics: Vec<String>) -> Self {
        Self {
            entity_kinds,
            metrics,
        }
    }

    /// Scope covering every entity kind
    pub fn all_kinds(metrics: Vec<String>) -> Self {
        Self::new(Vec::new(), metrics)
    }

    pub fn entity_kinds(&self) -> &[String] {
        &self.entity_kinds
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    /// Prefixes to hand to `scan_keys_by_prefix`
    pub fn scan_prefixes(&self) -> Vec<String> {
        if self.entity_kinds.is_empty() {
            return vec![String::new()];
        }
        self.entity_kinds
            .iter()
            .map(|kind| BufferKey::prefix_for(kind))
            .collect()
    }

    pub fn includes_kind(&self, entity_kind: &str) -> bool {
        self.entity_kinds.is_empty() || self.entity_kinds.iter().any(|k| k == entity_kind)
    }
}

impl Default for ReconcileScope {
    fn default() -> Self {
        Self::new(
            vec![DEFAULT_ENTITY_KIND.to_string()],
            vec![VIEWS_METRIC.to_string()],
        )
    }
}
