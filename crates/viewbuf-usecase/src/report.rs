//! Reconcile Report - What one drain did

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Result of reconciling a single counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Value written to durable storage; `cleared` is false when the
    /// buffer moved on during the flush and the entry was kept
    Flushed { value: i64, cleared: bool },
    /// Nothing buffered for this metric (or a concurrent drain took it)
    Absent,
    /// The entity is gone from durable storage; the buffer entry was dropped
    Discarded,
}

/// Summary of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Counters written to durable storage
    pub flushed: usize,
    /// Flushed counters whose buffer entry was kept because it advanced
    pub retained: usize,
    pub absent: usize,
    pub discarded: usize,
    /// Counters left buffered for the next pass
    pub failed: usize,
    pub malformed: usize,
}

impl ReconcileReport {
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: None,
            flushed: 0,
            retained: 0,
            absent: 0,
            discarded: 0,
            failed: 0,
            malformed: 0,
        }
    }

    pub fn record(&mut self, outcome: KeyOutcome) {
        match outcome {
            KeyOutcome::Flushed { cleared, .. } => {
                self.flushed += 1;
                if !cleared {
                    self.retained += 1;
                }
            }
            KeyOutcome::Absent => self.absent += 1,
            KeyOutcome::Discarded => self.discarded += 1,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Counters the pass looked at, malformed keys excluded
    pub fn keys_seen(&self) -> usize {
        self.flushed + self.absent + self.discarded + self.failed
    }

    /// No failures and no malformed keys
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.malformed == 0
    }

    pub fn elapsed_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcomes() {
        let mut report = ReconcileReport::new(Uuid::new_v4(), Utc::now());

        report.record(KeyOutcome::Flushed { value: 3, cleared: true });
        report.record(KeyOutcome::Flushed { value: 8, cleared: false });
        report.record(KeyOutcome::Absent);
        report.record(KeyOutcome::Discarded);
        report.failed += 1;

        assert_eq!(report.flushed, 2);
        assert_eq!(report.retained, 1);
        assert_eq!(report.keys_seen(), 5);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_finish_sets_elapsed() {
        let mut report = ReconcileReport::new(Uuid::new_v4(), Utc::now());
        assert!(report.elapsed_ms().is_none());

        report.finish();

        assert!(report.elapsed_ms().unwrap() >= 0);
        assert!(report.is_clean());
    }
}
