//! # viewbuf Domain Layer
//!
//! Pure vocabulary and ports for buffered view counting.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Domain Layer (This Crate)                     │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │  model/     - CounterKey, BufferKey, ReconcileScope         ││
//! │  │  repository/- BufferStore / DurableCounterStore traits      ││
//! │  │  service/   - ReconcilePlan (which keys a pass touches)     ││
//! │  └─────────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## The Golden Rule
//!
//! **This crate has ZERO external dependencies.**
//!
//! Swapping Redis for Memcached or Postgres for SQLite never touches
//! this crate.

pub mod model;
pub mod repository;
pub mod service;

// Re-export commonly used types
pub use model::{
    counter_key::{BufferKey, CounterKey, KeyParseError, KEY_SEPARATOR},
    scope::{ReconcileScope, DEFAULT_ENTITY_KIND, VIEWS_METRIC},
};

pub use repository::{
    buffer_store::{BufferError, BufferStore},
    durable_store::{DurableCounterStore, DurableStoreError},
};

pub use service::reconcile_plan::ReconcilePlan;
