//! Counter Buffer Client - Record one metric event per content read
//!
//! The common path is a single conditional increment in the buffer. The
//! durable store is read once per key after each flush, to seed the
//! accumulator with the current authoritative count. The buffered value is
//! therefore always an absolute total, and a flush is a plain set.
//!
//! The increment never creates a field. If a flush drains the field between
//! the seed and the increment, the increment misses and the event reseeds
//! from the freshly flushed durable count.

use std::sync::Arc;

use tracing::{debug, warn};
use viewbuf_domain::{BufferStore, CounterKey, DurableCounterStore, DurableStoreError};

use crate::error::{CounterError, Result};

/// Seed rounds before an event is given up on
const MAX_SEED_ATTEMPTS: u32 = 3;

/// What happened to a recorded event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Increment applied; `value` is the buffered total afterwards
    Buffered { value: i64, seeded: bool },
    /// The entity no longer exists in durable storage; nothing buffered
    EntityMissing,
}

/// Entry point for the read path
pub struct CounterBufferClient<B, D> {
    buffer: Arc<B>,
    durable: Arc<D>,
}

impl<B, D> Clone for CounterBufferClient<B, D> {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
            durable: Arc::clone(&self.durable),
        }
    }
}

impl<B, D> CounterBufferClient<B, D>
where
    B: BufferStore,
    D: DurableCounterStore,
{
    pub fn new(buffer: Arc<B>, durable: Arc<D>) -> Self {
        Self { buffer, durable }
    }

    /// Record one occurrence of `metric` for the entity
    ///
    /// Never fails: when the buffer (or the seed read) is unavailable the
    /// event is dropped and logged. Counts are allowed to lag or lose an
    /// event; the caller's request is not.
    pub async fn record_event(&self, entity_kind: &str, entity_id: i64, metric: &str) {
        let key = CounterKey::new(entity_kind, entity_id, metric);

        match self.try_record(&key).await {
            Ok(RecordOutcome::Buffered { value, seeded }) => {
                debug!(key = %key, value, seeded, "counter event buffered");
            }
            Ok(RecordOutcome::EntityMissing) => {
                debug!(key = %key, "entity gone, counter event dropped");
            }
            Err(err) if err.is_buffer_unavailable() => {
                warn!(key = %key, error = %err, "buffer unavailable, counter event dropped");
            }
            Err(err) => {
                warn!(key = %key, error = %err, "counter event dropped");
            }
        }
    }

    /// Fallible core of [`record_event`](Self::record_event)
    pub async fn try_record(&self, key: &CounterKey) -> Result<RecordOutcome> {
        let mut seeded = false;

        for _ in 0..MAX_SEED_ATTEMPTS {
            let existing = self
                .buffer
                .increment_existing(key, 1)
                .await
                .map_err(|e| CounterError::buffer(key, e))?;
            if let Some(value) = existing {
                return Ok(RecordOutcome::Buffered { value, seeded });
            }

            // Without a baseline the next flush would overwrite the durable
            // count with a tiny absolute value, so no seed means no event.
            let baseline = match self.durable.get_current_count(key).await {
                Ok(count) => count,
                Err(DurableStoreError::NotFound { .. }) => return Ok(RecordOutcome::EntityMissing),
                Err(err) => return Err(CounterError::durable_read(key, err)),
            };

            // Set-if-absent: a concurrent first touch may have won the seed.
            seeded |= self
                .buffer
                .put(key, baseline)
                .await
                .map_err(|e| CounterError::buffer(key, e))?;
        }

        Err(CounterError::SeedContended {
            key: key.to_string(),
            attempts: MAX_SEED_ATTEMPTS,
        })
    }

    pub fn buffer(&self) -> &Arc<B> {
        &self.buffer
    }
}
