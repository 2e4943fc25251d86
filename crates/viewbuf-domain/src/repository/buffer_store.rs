//! Buffer Store - Fast, shared, process-external counter buffer
//!
//! Fields live in a two-level map: outer key `"<entityKind>::<entityId>"`,
//! inner field `metric`. Every operation is atomic per field; callers add
//! no locking of their own.

use core::future::Future;

use crate::model::counter_key::CounterKey;

/// Errors surfaced by a buffer store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// The store cannot be reached
    Unavailable { message: String },
    /// The store refused the operation (e.g. counter overflow)
    Rejected { key: String, message: String },
}

impl core::fmt::Display for BufferError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BufferError::Unavailable { message } => {
                write!(f, "Buffer store unavailable: {}", message)
            }
            BufferError::Rejected { key, message } => {
                write!(f, "Buffer store rejected '{}': {}", key, message)
            }
        }
    }
}

impl std::error::Error for BufferError {}

/// Buffer Store Trait
///
/// This is a PORT in hexagonal architecture.
/// Implementable over any atomic-increment key/value service.
pub trait BufferStore: Send + Sync {
    /// Current value of the field, `None` when absent
    fn get(
        &self,
        key: &CounterKey,
    ) -> impl Future<Output = Result<Option<i64>, BufferError>> + Send;

    /// Seed the field with an initial value
    ///
    /// Only writes when the field is absent (set-if-absent), returning
    /// whether the write happened.
    fn put(
        &self,
        key: &CounterKey,
        value: i64,
    ) -> impl Future<Output = Result<bool, BufferError>> + Send;

    /// Atomically add `delta`, creating the field with `delta` if absent
    fn increment_by(
        &self,
        key: &CounterKey,
        delta: i64,
    ) -> impl Future<Output = Result<i64, BufferError>> + Send;

    /// Atomically add `delta` only if the field exists
    ///
    /// Returns `None` and writes nothing when the field is absent, so a
    /// field drained by a concurrent flush is never recreated without its
    /// seed.
    fn increment_existing(
        &self,
        key: &CounterKey,
        delta: i64,
    ) -> impl Future<Output = Result<Option<i64>, BufferError>> + Send;

    /// Remove the field (and the outer key once it has no fields left)
    fn delete(&self, key: &CounterKey) -> impl Future<Output = Result<(), BufferError>> + Send;

    /// Outer keys starting with `prefix`
    fn scan_keys_by_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<String>, BufferError>> + Send;

    /// Remove the field only if it still holds `expected`
    ///
    /// Returns `true` when the field was removed or was already gone.
    /// The default is get-compare-delete and is NOT atomic; stores that
    /// can compare-and-delete in one step should override it.
    fn delete_if_unchanged(
        &self,
        key: &CounterKey,
        expected: i64,
    ) -> impl Future<Output = Result<bool, BufferError>> + Send {
        async move {
            match self.get(key).await? {
                None => Ok::<bool, BufferError>(true),
                Some(current) if current == expected => {
                    self.delete(key).await?;
                    Ok(true)
                }
                Some(_) => Ok(false),
            }
        }
    }
}
