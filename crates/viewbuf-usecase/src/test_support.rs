//! Minimal in-process stores for use case tests

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use viewbuf_domain::{BufferError, BufferStore, CounterKey, DurableCounterStore, DurableStoreError};

/// Buffer double for use case tests
///
/// Keeps the trait's default `delete_if_unchanged` (get-compare-delete) and
/// has no overflow check. The atomic paths of the real store are covered by
/// the adapter crate's tests.
#[derive(Debug, Default)]
pub struct FakeBuffer {
    hashes: Mutex<BTreeMap<String, HashMap<String, i64>>>,
    offline: AtomicBool,
    /// Upcoming `increment_existing` calls that find their field drained
    drained_increments: AtomicUsize,
}

impl FakeBuffer {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn insert_raw(&self, outer: &str, field: &str, value: i64) {
        self.hashes
            .lock()
            .unwrap()
            .entry(outer.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }

    pub fn value(&self, key: &CounterKey) -> Option<i64> {
        self.hashes
            .lock()
            .unwrap()
            .get(&key.outer_key())
            .and_then(|h| h.get(key.metric()).copied())
    }

    /// Remove the field right before each of the next `n` conditional
    /// increments, as a flush landing in between would
    pub fn drain_before_increments(&self, n: usize) {
        self.drained_increments.store(n, Ordering::SeqCst);
    }

    pub fn field_count(&self) -> usize {
        self.hashes.lock().unwrap().values().map(|h| h.len()).sum()
    }

    fn check(&self) -> Result<(), BufferError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BufferError::Unavailable {
                message: "offline".to_string(),
            });
        }
        Ok(())
    }
}

impl BufferStore for FakeBuffer {
    async fn get(&self, key: &CounterKey) -> Result<Option<i64>, BufferError> {
        self.check()?;
        Ok(self.value(key))
    }

    async fn put(&self, key: &CounterKey, value: i64) -> Result<bool, BufferError> {
        self.check()?;
        let mut hashes = self.hashes.lock().unwrap();
        let fields = hashes.entry(key.outer_key()).or_default();
        if fields.contains_key(key.metric()) {
            return Ok(false);
        }
        fields.insert(key.metric().to_string(), value);
        Ok(true)
    }

    async fn increment_by(&self, key: &CounterKey, delta: i64) -> Result<i64, BufferError> {
        self.check()?;
        let mut hashes = self.hashes.lock().unwrap();
        let slot = hashes
            .entry(key.outer_key())
            .or_default()
            .entry(key.metric().to_string())
            .or_insert(0);
        *slot += delta;
        Ok(*slot)
    }

    async fn increment_existing(
        &self,
        key: &CounterKey,
        delta: i64,
    ) -> Result<Option<i64>, BufferError> {
        self.check()?;
        let drain = self
            .drained_increments
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if drain {
            self.delete(key).await?;
        }
        let mut hashes = self.hashes.lock().unwrap();
        let slot = hashes
            .get_mut(&key.outer_key())
            .and_then(|fields| fields.get_mut(key.metric()));
        Ok(slot.map(|slot| {
            *slot += delta;
            *slot
        }))
    }

    async fn delete(&self, key: &CounterKey) -> Result<(), BufferError> {
        self.check()?;
        let mut hashes = self.hashes.lock().unwrap();
        if let Some(fields) = hashes.get_mut(&key.outer_key()) {
            fields.remove(key.metric());
            if fields.is_empty() {
                hashes.remove(&key.outer_key());
            }
        }
        Ok(())
    }

    async fn scan_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, BufferError> {
        self.check()?;
        Ok(self
            .hashes
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Durable store with per-key failure and latency injection
#[derive(Debug, Default)]
pub struct FakeDurable {
    counts: Mutex<HashMap<String, HashMap<String, i64>>>,
    failing: Mutex<HashSet<CounterKey>>,
    slow: Mutex<HashSet<CounterKey>>,
    read_offline: AtomicBool,
    writes: AtomicUsize,
    reads: AtomicUsize,
    /// Buffer bumped during `set_count`, simulating a read racing the flush
    racing_buffer: Mutex<Option<Arc<FakeBuffer>>>,
}

impl FakeDurable {
    pub fn with_entity(self, kind: &str, id: i64, metric: &str, value: i64) -> Self {
        self.counts
            .lock()
            .unwrap()
            .entry(format!("{}::{}", kind, id))
            .or_default()
            .insert(metric.to_string(), value);
        self
    }

    pub fn count(&self, key: &CounterKey) -> Option<i64> {
        self.counts
            .lock()
            .unwrap()
            .get(&key.outer_key())
            .and_then(|h| h.get(key.metric()).copied())
    }

    pub fn fail_writes_for(&self, key: CounterKey) {
        self.failing.lock().unwrap().insert(key);
    }

    pub fn slow_writes_for(&self, key: CounterKey) {
        self.slow.lock().unwrap().insert(key);
    }

    pub fn set_read_offline(&self, offline: bool) {
        self.read_offline.store(offline, Ordering::SeqCst);
    }

    pub fn race_with(&self, buffer: Arc<FakeBuffer>) {
        *self.racing_buffer.lock().unwrap() = Some(buffer);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl DurableCounterStore for FakeDurable {
    async fn get_current_count(&self, key: &CounterKey) -> Result<i64, DurableStoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.read_offline.load(Ordering::SeqCst) {
            return Err(DurableStoreError::Unavailable {
                message: "db down".to_string(),
            });
        }
        let counts = self.counts.lock().unwrap();
        let fields = counts
            .get(&key.outer_key())
            .ok_or_else(|| DurableStoreError::NotFound {
                entity: key.outer_key(),
            })?;
        Ok(fields.get(key.metric()).copied().unwrap_or(0))
    }

    async fn set_count(&self, key: &CounterKey, value: i64) -> Result<(), DurableStoreError> {
        let slow = self.slow.lock().unwrap().contains(key);
        if slow {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing.lock().unwrap().contains(key) {
            return Err(DurableStoreError::WriteFailed {
                message: "constraint violation".to_string(),
            });
        }
        {
            let mut counts = self.counts.lock().unwrap();
            let fields = counts
                .get_mut(&key.outer_key())
                .ok_or_else(|| DurableStoreError::NotFound {
                    entity: key.outer_key(),
                })?;
            fields.insert(key.metric().to_string(), value);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);

        let racing = self.racing_buffer.lock().unwrap().clone();
        if let Some(buffer) = racing {
            buffer.increment_by(key, 1).await.ok();
        }
        Ok(())
    }
}
