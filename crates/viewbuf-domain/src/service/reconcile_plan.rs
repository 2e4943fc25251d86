//! Reconcile Plan - Turn a raw buffer scan into the counters to drain
//!
//! A scan returns outer keys only. The plan parses each one, drops kinds
//! outside the scope, and expands the rest into one `CounterKey` per
//! metric in scope. Keys that don't parse are kept aside so the caller
//! can log and skip them without aborting the pass.

use std::collections::BTreeSet;

use crate::model::counter_key::{BufferKey, CounterKey, KeyParseError};
use crate::model::scope::ReconcileScope;

/// What one reconciliation pass will touch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    keys: Vec<CounterKey>,
    malformed: Vec<(String, KeyParseError)>,
}

impl ReconcilePlan {
    /// Build a plan from scanned outer keys
    ///
    /// Duplicate keys (e.g. from overlapping prefixes) are collapsed and
    /// the result is ordered, so passes are deterministic.
    pub fn build<I, S>(scope: &ReconcileScope, scanned: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entities = BTreeSet::new();
        let mut malformed = Vec::new();
        let mut seen_malformed = BTreeSet::new();

        for raw in scanned {
            let raw = raw.into();
            match BufferKey::parse(&raw) {
                Ok(entity) if scope.includes_kind(entity.entity_kind()) => {
                    entities.insert(entity);
                }
                Ok(_) => {}
                Err(err) => {
                    if seen_malformed.insert(raw.clone()) {
                        malformed.push((raw, err));
                    }
                }
            }
        }

        let keys = entities
            .into_iter()
            .flat_map(|entity| {
                scope
                    .metrics()
                    .iter()
                    .map(move |metric| CounterKey::from_parts(entity.clone(), metric.clone()))
            })
            .collect();

        Self { keys, malformed }
    }

    /// Counters to drain, in order
    pub fn keys(&self) -> &[CounterKey] {
        &self.keys
    }

    /// Raw keys that failed to parse
    pub fn malformed(&self) -> &[(String, KeyParseError)] {
        &self.malformed
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.malformed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_expands_metrics() {
        let scope = ReconcileScope::new(
            vec!["post".to_string()],
            vec!["views".to_string(), "likes".to_string()],
        );

        let plan = ReconcilePlan::build(&scope, ["post::1"]);

        assert_eq!(
            plan.keys(),
            &[
                CounterKey::new("post", 1, "views"),
                CounterKey::new("post", 1, "likes"),
            ]
        );
    }

    #[test]
    fn test_plan_separates_malformed() {
        let scope = ReconcileScope::all_kinds(vec!["views".to_string()]);

        let plan = ReconcilePlan::build(&scope, ["post::3", "garbage"]);

        assert_eq!(plan.keys(), &[CounterKey::new("post", 3, "views")]);
        assert_eq!(plan.malformed().len(), 1);
        assert_eq!(plan.malformed()[0].0, "garbage");
    }

    #[test]
    fn test_plan_filters_out_of_scope_kinds() {
        let scope = ReconcileScope::default();

        let plan = ReconcilePlan::build(&scope, ["review::9", "post::2"]);

        assert_eq!(plan.keys(), &[CounterKey::new("post", 2, "views")]);
        assert!(plan.malformed().is_empty());
    }

    #[test]
    fn test_plan_dedups_and_orders() {
        let scope = ReconcileScope::default();

        let plan = ReconcilePlan::build(&scope, ["post::10", "post::2", "post::10"]);

        let ids: Vec<i64> = plan.keys().iter().map(|k| k.entity_id()).collect();
        assert_eq!(ids, vec![2, 10]);
    }

    #[test]
    fn test_empty_plan() {
        let plan = ReconcilePlan::build(&ReconcileScope::default(), Vec::<String>::new());
        assert!(plan.is_empty());
    }
}
