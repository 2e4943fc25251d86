//! Error taxonomy for the counter subsystem
//!
//! None of these ever reach an end-user request: the read path swallows
//! them and the reconciler turns them into report entries.

use std::fmt::Display;

use thiserror::Error;
use viewbuf_domain::{BufferError, CounterKey, DurableStoreError, KeyParseError};

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("Buffer store unavailable: {0}")]
    BufferUnavailable(String),

    #[error("Buffer store rejected {key}: {message}")]
    BufferRejected { key: String, message: String },

    #[error("Durable write failed for {key}: {message}")]
    DurableWriteFailure { key: String, message: String },

    #[error("Durable read failed for {key}: {message}")]
    DurableReadFailure { key: String, message: String },

    #[error("Malformed buffer key '{raw}'")]
    MalformedBufferKey {
        raw: String,
        #[source]
        source: KeyParseError,
    },

    #[error("Buffer entry {key} was drained {attempts} times while seeding")]
    SeedContended { key: String, attempts: u32 },

    #[error("Entity {0} no longer exists")]
    EntityNotFound(String),

    #[error("{operation} on {key} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        key: String,
        timeout_ms: u64,
    },
}

impl CounterError {
    pub fn buffer(subject: impl Display, err: BufferError) -> Self {
        match err {
            BufferError::Unavailable { message } => CounterError::BufferUnavailable(message),
            BufferError::Rejected { message, .. } => CounterError::BufferRejected {
                key: subject.to_string(),
                message,
            },
        }
    }

    pub fn durable_read(key: &CounterKey, err: DurableStoreError) -> Self {
        match err {
            DurableStoreError::NotFound { entity } => CounterError::EntityNotFound(entity),
            other => CounterError::DurableReadFailure {
                key: key.to_string(),
                message: other.to_string(),
            },
        }
    }

    pub fn durable_write(key: &CounterKey, err: DurableStoreError) -> Self {
        match err {
            DurableStoreError::NotFound { entity } => CounterError::EntityNotFound(entity),
            other => CounterError::DurableWriteFailure {
                key: key.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Whether the buffer itself could not be reached
    pub fn is_buffer_unavailable(&self) -> bool {
        matches!(self, CounterError::BufferUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, CounterError>;
