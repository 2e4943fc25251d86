//! In-Memory Store Implementations
//!
//! Simple in-memory implementations of the store traits.
//! Useful for testing, development and single-process deployments.
//! Both stores can be switched offline to exercise degradation paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use viewbuf_domain::{
    BufferError, BufferKey, BufferStore, CounterKey, DurableCounterStore, DurableStoreError,
};

type Hashes = HashMap<String, HashMap<String, i64>>;

/// In-memory Buffer Store
///
/// Hash-of-hashes behind a RwLock. Every trait operation runs under a
/// single lock acquisition, so each one is atomic, including
/// `delete_if_unchanged`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBufferStore {
    hashes: Arc<RwLock<Hashes>>,
    offline: Arc<AtomicBool>,
}

impl InMemoryBufferStore {
    pub fn new() -> Self {
        Self {
            hashes: Arc::new(RwLock::new(HashMap::new())),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Simulate the store going away / coming back
    pub fn set_available(&self, available: bool) {
        self.offline.store(!available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    /// Write a raw field, bypassing key encoding (foreign writers, fixtures)
    pub fn insert_raw(
        &self,
        outer_key: impl Into<String>,
        field: impl Into<String>,
        value: i64,
    ) -> Result<(), BufferError> {
        let mut hashes = self.write()?;
        hashes
            .entry(outer_key.into())
            .or_default()
            .insert(field.into(), value);
        Ok(())
    }

    /// Current value, ignoring availability
    pub fn peek(&self, key: &CounterKey) -> Option<i64> {
        let hashes = self.hashes.read().ok()?;
        hashes
            .get(&key.outer_key())
            .and_then(|fields| fields.get(key.metric()).copied())
    }

    /// Number of buffered fields across all outer keys
    pub fn field_count(&self) -> usize {
        self.hashes
            .read()
            .map(|hashes| hashes.values().map(|fields| fields.len()).sum())
            .unwrap_or(0)
    }

    fn ensure_online(&self) -> Result<(), BufferError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BufferError::Unavailable {
                message: "in-memory buffer is offline".to_string(),
            });
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Hashes>, BufferError> {
        self.ensure_online()?;
        self.hashes.read().map_err(|_| BufferError::Unavailable {
            message: "Failed to acquire read lock".to_string(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Hashes>, BufferError> {
        self.ensure_online()?;
        self.hashes.write().map_err(|_| BufferError::Unavailable {
            message: "Failed to acquire write lock".to_string(),
        })
    }
}

fn remove_field(hashes: &mut Hashes, key: &CounterKey) {
    let outer = key.outer_key();
    if let Some(fields) = hashes.get_mut(&outer) {
        fields.remove(key.metric());
        if fields.is_empty() {
            hashes.remove(&outer);
        }
    }
}

impl BufferStore for InMemoryBufferStore {
    async fn get(&self, key: &CounterKey) -> Result<Option<i64>, BufferError> {
        let hashes = self.read()?;
        Ok(hashes
            .get(&key.outer_key())
            .and_then(|fields| fields.get(key.metric()).copied()))
    }

    async fn put(&self, key: &CounterKey, value: i64) -> Result<bool, BufferError> {
        let mut hashes = self.write()?;
        let fields = hashes.entry(key.outer_key()).or_default();
        if fields.contains_key(key.metric()) {
            return Ok(false);
        }
        fields.insert(key.metric().to_string(), value);
        Ok(true)
    }

    async fn increment_by(&self, key: &CounterKey, delta: i64) -> Result<i64, BufferError> {
        let mut hashes = self.write()?;
        let slot = hashes
            .entry(key.outer_key())
            .or_default()
            .entry(key.metric().to_string())
            .or_insert(0);
        *slot = slot.checked_add(delta).ok_or_else(|| BufferError::Rejected {
            key: key.to_string(),
            message: "increment would overflow".to_string(),
        })?;
        Ok(*slot)
    }

    async fn increment_existing(
        &self,
        key: &CounterKey,
        delta: i64,
    ) -> Result<Option<i64>, BufferError> {
        let mut hashes = self.write()?;
        let Some(slot) = hashes
            .get_mut(&key.outer_key())
            .and_then(|fields| fields.get_mut(key.metric()))
        else {
            return Ok(None);
        };
        *slot = slot.checked_add(delta).ok_or_else(|| BufferError::Rejected {
            key: key.to_string(),
            message: "increment would overflow".to_string(),
        })?;
        Ok(Some(*slot))
    }

    async fn delete(&self, key: &CounterKey) -> Result<(), BufferError> {
        let mut hashes = self.write()?;
        remove_field(&mut hashes, key);
        Ok(())
    }

    async fn scan_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, BufferError> {
        let hashes = self.read()?;
        let mut keys: Vec<String> = hashes
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_if_unchanged(&self, key: &CounterKey, expected: i64) -> Result<bool, BufferError> {
        let mut hashes = self.write()?;
        let current = hashes
            .get(&key.outer_key())
            .and_then(|fields| fields.get(key.metric()).copied());
        match current {
            Some(value) if value != expected => Ok(false),
            Some(_) => {
                remove_field(&mut hashes, key);
                Ok(true)
            }
            None => Ok(true),
        }
    }
}

/// In-memory Durable Counter Store
///
/// Entities must be registered before their counters can be read or set,
/// mirroring a persistence layer where the content row must exist.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCounterStore {
    entities: Arc<RwLock<HashMap<BufferKey, HashMap<String, i64>>>>,
    failing: Arc<RwLock<HashSet<CounterKey>>>,
    offline: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_entity(&self, entity_kind: impl Into<String>, entity_id: i64) {
        if let Ok(mut entities) = self.entities.write() {
            entities
                .entry(BufferKey::new(entity_kind, entity_id))
                .or_default();
        }
    }

    /// Register the entity (if needed) with an initial counter value
    pub fn set_initial(&self, key: &CounterKey, value: i64) {
        if let Ok(mut entities) = self.entities.write() {
            entities
                .entry(key.entity().clone())
                .or_default()
                .insert(key.metric().to_string(), value);
        }
    }

    /// Delete the entity, as when a post is removed
    pub fn remove_entity(&self, entity_kind: &str, entity_id: i64) {
        if let Ok(mut entities) = self.entities.write() {
            entities.remove(&BufferKey::new(entity_kind, entity_id));
        }
    }

    /// Stored value; `None` when the entity or metric is missing
    pub fn count(&self, key: &CounterKey) -> Option<i64> {
        let entities = self.entities.read().ok()?;
        entities
            .get(key.entity())
            .and_then(|fields| fields.get(key.metric()).copied())
    }

    /// Make every `set_count` for this key fail
    pub fn fail_writes_for(&self, key: CounterKey) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(key);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing.write() {
            failing.clear();
        }
    }

    pub fn set_available(&self, available: bool) {
        self.offline.store(!available, Ordering::SeqCst);
    }

    /// Successful `set_count` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<(), DurableStoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DurableStoreError::Unavailable {
                message: "in-memory counter store is offline".to_string(),
            });
        }
        Ok(())
    }
}

impl DurableCounterStore for InMemoryCounterStore {
    async fn get_current_count(&self, key: &CounterKey) -> Result<i64, DurableStoreError> {
        self.ensure_online()?;
        let entities = self.entities.read().map_err(|_| DurableStoreError::Unavailable {
            message: "Failed to acquire read lock".to_string(),
        })?;
        let fields = entities
            .get(key.entity())
            .ok_or_else(|| DurableStoreError::NotFound {
                entity: key.outer_key(),
            })?;
        Ok(fields.get(key.metric()).copied().unwrap_or(0))
    }

    async fn set_count(&self, key: &CounterKey, value: i64) -> Result<(), DurableStoreError> {
        self.ensure_online()?;

        let rejected = self
            .failing
            .read()
            .map(|failing| failing.contains(key))
            .unwrap_or(false);
        if rejected {
            return Err(DurableStoreError::WriteFailed {
                message: format!("write rejected for {}", key),
            });
        }

        let mut entities = self.entities.write().map_err(|_| DurableStoreError::Unavailable {
            message: "Failed to acquire write lock".to_string(),
        })?;
        let fields = entities
            .get_mut(key.entity())
            .ok_or_else(|| DurableStoreError::NotFound {
                entity: key.outer_key(),
            })?;
        fields.insert(key.metric().to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
