//! Durable Counter Store - Authoritative persistent counter values
//!
//! Implemented by the persistence layer of the surrounding application.
//! The counter subsystem only ever reads a baseline and writes absolute
//! totals back.

use core::future::Future;

use crate::model::counter_key::CounterKey;

/// Errors that can occur against the durable store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DurableStoreError {
    /// The entity behind the counter does not exist (or was deleted)
    NotFound { entity: String },
    /// The store could not be reached
    Unavailable { message: String },
    /// The store rejected the write
    WriteFailed { message: String },
}

impl core::fmt::Display for DurableStoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DurableStoreError::NotFound { entity } => {
                write!(f, "Entity not found: {}", entity)
            }
            DurableStoreError::Unavailable { message } => {
                write!(f, "Durable store unavailable: {}", message)
            }
            DurableStoreError::WriteFailed { message } => {
                write!(f, "Durable write failed: {}", message)
            }
        }
    }
}

impl std::error::Error for DurableStoreError {}

/// Durable Counter Store Trait
///
/// This is a PORT in hexagonal architecture.
pub trait DurableCounterStore: Send + Sync {
    /// Authoritative count for the key
    ///
    /// An existing entity with no recorded value for the metric reads as 0.
    fn get_current_count(
        &self,
        key: &CounterKey,
    ) -> impl Future<Output = Result<i64, DurableStoreError>> + Send;

    /// Absolute set; applying the same value twice is a no-op
    fn set_count(
        &self,
        key: &CounterKey,
        value: i64,
    ) -> impl Future<Output = Result<(), DurableStoreError>> + Send;
}
