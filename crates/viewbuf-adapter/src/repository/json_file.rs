//! JSON File Counter Store
//!
//! A durable store for development and single-node setups. The whole table
//! is kept in memory and rewritten on every change (temp file + rename),
//! so a crash never leaves a half-written file behind.
//!
//! File layout:
//!
//! ```json
//! { "post::1": { "views": 13 }, "post::2": {} }
//! ```
//!
//! An outer key present in the file means the entity exists.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::debug;
use viewbuf_domain::{BufferKey, CounterKey, DurableCounterStore, DurableStoreError};

type CounterTable = BTreeMap<String, BTreeMap<String, i64>>;

#[derive(Debug)]
pub struct JsonFileCounterStore {
    path: PathBuf,
    table: Mutex<CounterTable>,
}

impl JsonFileCounterStore {
    /// Open the store, starting empty when the file does not exist yet
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, DurableStoreError> {
        let path = path.into();

        let table = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                DurableStoreError::Unavailable {
                    message: format!("Corrupt counter file {}: {}", path.display(), e),
                }
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => CounterTable::new(),
            Err(e) => {
                return Err(DurableStoreError::Unavailable {
                    message: format!("Failed to read {}: {}", path.display(), e),
                })
            }
        };

        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the entity row if it does not exist yet
    pub async fn register_entity(
        &self,
        entity_kind: &str,
        entity_id: i64,
    ) -> Result<(), DurableStoreError> {
        let outer = BufferKey::new(entity_kind, entity_id).encode();
        let mut table = self.table.lock().await;
        if table.contains_key(&outer) {
            return Ok(());
        }
        table.insert(outer.clone(), BTreeMap::new());
        if let Err(err) = self.persist(&table).await {
            table.remove(&outer);
            return Err(err);
        }
        Ok(())
    }

    /// Stored value; `None` when the entity or metric is missing
    pub async fn count(&self, key: &CounterKey) -> Option<i64> {
        let table = self.table.lock().await;
        table
            .get(&key.outer_key())
            .and_then(|fields| fields.get(key.metric()).copied())
    }

    async fn persist(&self, table: &CounterTable) -> Result<(), DurableStoreError> {
        let body = serde_json::to_vec_pretty(table).map_err(|e| DurableStoreError::WriteFailed {
            message: format!("Failed to encode counters: {}", e),
        })?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| DurableStoreError::WriteFailed {
                message: format!("Failed to write {}: {}", tmp.display(), e),
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| DurableStoreError::WriteFailed {
                message: format!("Failed to replace {}: {}", self.path.display(), e),
            })?;

        debug!(path = %self.path.display(), entities = table.len(), "counter file written");
        Ok(())
    }
}

impl DurableCounterStore for JsonFileCounterStore {
    async fn get_current_count(&self, key: &CounterKey) -> Result<i64, DurableStoreError> {
        let table = self.table.lock().await;
        let fields = table
            .get(&key.outer_key())
            .ok_or_else(|| DurableStoreError::NotFound {
                entity: key.outer_key(),
            })?;
        Ok(fields.get(key.metric()).copied().unwrap_or(0))
    }

    async fn set_count(&self, key: &CounterKey, value: i64) -> Result<(), DurableStoreError> {
        let mut table = self.table.lock().await;
        let fields = table
            .get_mut(&key.outer_key())
            .ok_or_else(|| DurableStoreError::NotFound {
                entity: key.outer_key(),
            })?;

        let previous = fields.insert(key.metric().to_string(), value);
        if previous == Some(value) {
            return Ok(());
        }

        if let Err(err) = self.persist(&table).await {
            if let Some(fields) = table.get_mut(&key.outer_key()) {
                match previous {
                    Some(old) => fields.insert(key.metric().to_string(), old),
                    None => fields.remove(key.metric()),
                };
            }
            return Err(err);
        }
        Ok(())
    }
}
