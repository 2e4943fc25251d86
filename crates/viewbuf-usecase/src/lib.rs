//! # viewbuf Use Case Layer
//!
//! Application-specific business rules for buffered view counting.
//! This layer orchestrates the flow of data between the domain ports.
//!
//! - [`CounterBufferClient`] - called on every content read
//! - [`Reconciler`] - one drain of the buffer into durable storage

pub mod error;
pub mod reconcile;
pub mod record_event;
pub mod report;

#[cfg(test)]
mod test_support;

pub use viewbuf_domain;

pub use error::{CounterError, Result};
pub use reconcile::{PassOutcome, Reconciler, ReconcilerOptions};
pub use record_event::{CounterBufferClient, RecordOutcome};
pub use report::{KeyOutcome, ReconcileReport};
