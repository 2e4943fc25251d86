//! Reconciler - Drain buffered counters into durable storage
//!
//! One pass:
//! 1. Scan the buffer for outer keys in scope
//! 2. For each counter: read `v`, `set_count(v)`, then clear the entry
//!    if it still holds `v`
//! 3. Report what happened
//!
//! Keys are independent. A failed durable write leaves the entry buffered
//! for the next pass; since `v` is an absolute total, retrying is safe.
//!
//! Passes never overlap: a pass requested while another is running is
//! skipped, not queued.
//!
//! Loss window: with a store whose `delete_if_unchanged` is the non-atomic
//! default, an increment landing between the compare and the delete is
//! lost. Stores with an atomic compare-and-delete close that window.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;
use viewbuf_domain::{
    BufferStore, CounterKey, DurableCounterStore, DurableStoreError, ReconcilePlan, ReconcileScope,
};

use crate::error::{CounterError, Result};
use crate::report::{KeyOutcome, ReconcileReport};

/// Per-call bound applied to every store call inside a pass
pub const DEFAULT_KEY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerOptions {
    pub scope: ReconcileScope,
    pub key_timeout: Duration,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            scope: ReconcileScope::default(),
            key_timeout: DEFAULT_KEY_TIMEOUT,
        }
    }
}

/// How a requested pass ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(ReconcileReport),
    /// The buffer could not be scanned; nothing was written or deleted
    SkippedBufferUnavailable { reason: String },
    /// Another pass was still running
    SkippedBusy,
}

impl PassOutcome {
    pub fn report(&self) -> Option<&ReconcileReport> {
        match self {
            PassOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PassOutcome::Completed(_))
    }
}

pub struct Reconciler<B, D> {
    buffer: Arc<B>,
    durable: Arc<D>,
    options: ReconcilerOptions,
    running: Mutex<()>,
}

impl<B, D> Reconciler<B, D>
where
    B: BufferStore,
    D: DurableCounterStore,
{
    pub fn new(buffer: Arc<B>, durable: Arc<D>, options: ReconcilerOptions) -> Self {
        Self {
            buffer,
            durable,
            options,
            running: Mutex::new(()),
        }
    }

    pub fn options(&self) -> &ReconcilerOptions {
        &self.options
    }

    /// Run one reconciliation pass unless one is already in flight
    pub async fn run_pass(&self) -> PassOutcome {
        let Ok(_running) = self.running.try_lock() else {
            debug!("reconciliation pass already running, skipping");
            return PassOutcome::SkippedBusy;
        };

        let run_id = Uuid::new_v4();
        self.drain(run_id)
            .instrument(info_span!("reconcile", %run_id))
            .await
    }

    async fn drain(&self, run_id: Uuid) -> PassOutcome {
        let mut report = ReconcileReport::new(run_id, Utc::now());

        let scanned = match self.scan().await {
            Ok(scanned) => scanned,
            Err(err) => {
                warn!(error = %err, "buffer unavailable, skipping reconciliation pass");
                return PassOutcome::SkippedBufferUnavailable {
                    reason: err.to_string(),
                };
            }
        };

        let plan = ReconcilePlan::build(&self.options.scope, scanned);

        for (raw, source) in plan.malformed() {
            let err = CounterError::MalformedBufferKey {
                raw: raw.clone(),
                source: source.clone(),
            };
            warn!(error = %err, reason = %source, "skipping malformed buffer key");
            report.malformed += 1;
        }

        for key in plan.keys() {
            match self.reconcile_key(key).await {
                Ok(outcome) => {
                    debug!(key = %key, ?outcome, "counter reconciled");
                    report.record(outcome);
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "counter left buffered for next pass");
                    report.failed += 1;
                }
            }
        }

        report.finish();
        info!(
            flushed = report.flushed,
            retained = report.retained,
            absent = report.absent,
            discarded = report.discarded,
            failed = report.failed,
            malformed = report.malformed,
            "reconciliation pass complete"
        );

        PassOutcome::Completed(report)
    }

    async fn scan(&self) -> Result<Vec<String>> {
        let mut scanned = Vec::new();
        for prefix in self.options.scope.scan_prefixes() {
            let keys = self
                .bounded("scan", &prefix, self.buffer.scan_keys_by_prefix(&prefix))
                .await?
                .map_err(|e| CounterError::buffer(&prefix, e))?;
            scanned.extend(keys);
        }
        Ok(scanned)
    }

    async fn reconcile_key(&self, key: &CounterKey) -> Result<KeyOutcome> {
        let buffered = self
            .bounded("buffer get", key, self.buffer.get(key))
            .await?
            .map_err(|e| CounterError::buffer(key, e))?;

        let Some(value) = buffered else {
            return Ok(KeyOutcome::Absent);
        };

        match self
            .bounded("durable set", key, self.durable.set_count(key, value))
            .await?
        {
            Ok(()) => {}
            Err(DurableStoreError::NotFound { entity }) => {
                self.bounded("buffer delete", key, self.buffer.delete(key))
                    .await?
                    .map_err(|e| CounterError::buffer(key, e))?;
                warn!(key = %key, entity = %entity, value, "entity gone, buffered counter discarded");
                return Ok(KeyOutcome::Discarded);
            }
            Err(err) => return Err(CounterError::durable_write(key, err)),
        }

        let cleared = self
            .bounded(
                "buffer delete",
                key,
                self.buffer.delete_if_unchanged(key, value),
            )
            .await?
            .map_err(|e| CounterError::buffer(key, e))?;

        if !cleared {
            debug!(key = %key, value, "buffer advanced during flush, entry kept");
        }

        Ok(KeyOutcome::Flushed { value, cleared })
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        subject: impl Display,
        call: impl Future<Output = T>,
    ) -> Result<T> {
        let limit = self.options.key_timeout;
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| CounterError::Timeout {
                operation,
                key: subject.to_string(),
                timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeBuffer, FakeDurable};

    fn reconciler(
        buffer: Arc<FakeBuffer>,
        durable: Arc<FakeDurable>,
    ) -> Reconciler<FakeBuffer, FakeDurable> {
        Reconciler::new(buffer, durable, ReconcilerOptions::default())
    }

    fn views(id: i64) -> CounterKey {
        CounterKey::new("post", id, "views")
    }

    // ============== Flush Tests ==============

    #[tokio::test]
    async fn test_pass_sets_absolute_value_and_clears() {
        let buffer = Arc::new(FakeBuffer::default());
        buffer.insert_raw("post::1", "views", 13);
        let durable = Arc::new(FakeDurable::default().with_entity("post", 1, "views", 10));

        let outcome = reconciler(buffer.clone(), durable.clone()).run_pass().await;

        let report = outcome.report().unwrap();
        assert_eq!(report.flushed, 1);
        assert!(report.is_clean());
        assert_eq!(durable.count(&views(1)), Some(13));
        assert_eq!(buffer.value(&views(1)), None);
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let buffer = Arc::new(FakeBuffer::default());
        buffer.insert_raw("post::2", "views", 1);
        let durable = Arc::new(FakeDurable::default().with_entity("post", 2, "views", 0));
        let reconciler = reconciler(buffer.clone(), durable.clone());

        reconciler.run_pass().await;
        let second = reconciler.run_pass().await;

        assert_eq!(durable.count(&views(2)), Some(1));
        assert_eq!(durable.writes(), 1);
        assert_eq!(second.report().unwrap().keys_seen(), 0);
        assert_eq!(buffer.field_count(), 0);
    }

    #[tokio::test]
    async fn test_metric_outside_scope_is_untouched() {
        let buffer = Arc::new(FakeBuffer::default());
        buffer.insert_raw("post::1", "views", 4);
        buffer.insert_raw("post::1", "likes", 9);
        let durable = Arc::new(FakeDurable::default().with_entity("post", 1, "views", 0));

        reconciler(buffer.clone(), durable.clone()).run_pass().await;

        assert_eq!(buffer.value(&views(1)), None);
        assert_eq!(buffer.value(&CounterKey::new("post", 1, "likes")), Some(9));
    }

    // ============== Failure Isolation Tests ==============

    #[tokio::test]
    async fn test_failed_write_keeps_entry_and_spares_others() {
        let buffer = Arc::new(FakeBuffer::default());
        buffer.insert_raw("post::1", "views", 5);
        buffer.insert_raw("post::2", "views", 6);
        let durable = Arc::new(
            FakeDurable::default()
                .with_entity("post", 1, "views", 0)
                .with_entity("post", 2, "views", 0),
        );
        durable.fail_writes_for(views(1));

        let outcome = reconciler(buffer.clone(), durable.clone()).run_pass().await;

        let report = outcome.report().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.flushed, 1);
        assert_eq!(buffer.value(&views(1)), Some(5));
        assert_eq!(durable.count(&views(2)), Some(6));
        assert_eq!(buffer.value(&views(2)), None);
    }

    #[tokio::test]
    async fn test_buffer_offline_skips_pass() {
        let buffer = Arc::new(FakeBuffer::default());
        buffer.insert_raw("post::1", "views", 5);
        buffer.set_offline(true);
        let durable = Arc::new(FakeDurable::default().with_entity("post", 1, "views", 0));

        let outcome = reconciler(buffer.clone(), durable.clone()).run_pass().await;

        assert!(matches!(outcome, PassOutcome::SkippedBufferUnavailable { .. }));
        assert_eq!(durable.writes(), 0);
        buffer.set_offline(false);
        assert_eq!(buffer.value(&views(1)), Some(5));
    }

    #[tokio::test]
    async fn test_malformed_keys_are_skipped() {
        let buffer = Arc::new(FakeBuffer::default());
        buffer.insert_raw("post::3", "views", 2);
        buffer.insert_raw("garbage", "views", 99);
        let durable = Arc::new(FakeDurable::default().with_entity("post", 3, "views", 0));
        let reconciler = Reconciler::new(
            buffer.clone(),
            durable.clone(),
            ReconcilerOptions {
                scope: ReconcileScope::all_kinds(vec!["views".to_string()]),
                ..Default::default()
            },
        );

        let outcome = reconciler.run_pass().await;

        let report = outcome.report().unwrap();
        assert_eq!(report.malformed, 1);
        assert_eq!(report.flushed, 1);
        assert_eq!(durable.count(&views(3)), Some(2));
    }

    #[tokio::test]
    async fn test_deleted_entity_is_discarded() {
        let buffer = Arc::new(FakeBuffer::default());
        buffer.insert_raw("post::8", "views", 3);
        let durable = Arc::new(FakeDurable::default());

        let outcome = reconciler(buffer.clone(), durable.clone()).run_pass().await;

        assert_eq!(outcome.report().unwrap().discarded, 1);
        assert_eq!(buffer.field_count(), 0);
    }

    // ============== Race Tests ==============

    #[tokio::test]
    async fn test_increment_during_flush_is_kept() {
        let buffer = Arc::new(FakeBuffer::default());
        buffer.insert_raw("post::1", "views", 10);
        let durable = Arc::new(FakeDurable::default().with_entity("post", 1, "views", 9));
        durable.race_with(buffer.clone());
        let reconciler = reconciler(buffer.clone(), durable.clone());

        let first = reconciler.run_pass().await;

        assert_eq!(first.report().unwrap().retained, 1);
        assert_eq!(durable.count(&views(1)), Some(10));
        assert_eq!(buffer.value(&views(1)), Some(11));

        // Next pass writes the newer total; the race hook bumps once more
        reconciler.run_pass().await;
        assert_eq!(durable.count(&views(1)), Some(11));
    }

    // ============== Timeout / Re-entrancy Tests ==============

    #[tokio::test(start_paused = true)]
    async fn test_slow_write_times_out() {
        let buffer = Arc::new(FakeBuffer::default());
        buffer.insert_raw("post::1", "views", 4);
        let durable = Arc::new(FakeDurable::default().with_entity("post", 1, "views", 0));
        durable.slow_writes_for(views(1));

        let outcome = reconciler(buffer.clone(), durable.clone()).run_pass().await;

        assert_eq!(outcome.report().unwrap().failed, 1);
        assert_eq!(buffer.value(&views(1)), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_pass_is_skipped() {
        let buffer = Arc::new(FakeBuffer::default());
        buffer.insert_raw("post::1", "views", 4);
        let durable = Arc::new(FakeDurable::default().with_entity("post", 1, "views", 0));
        durable.slow_writes_for(views(1));
        let reconciler = reconciler(buffer, durable);

        let (first, second) = tokio::join!(reconciler.run_pass(), reconciler.run_pass());

        assert!(first.is_completed());
        assert_eq!(second, PassOutcome::SkippedBusy);
    }
}
