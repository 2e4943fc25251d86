//! Store Traits - The "Ports" of Hexagonal Architecture
//!
//! These traits define what the counter subsystem needs from its stores,
//! but NOT how it's actually done. That's the adapter's job.
//!
//! ```text
//! Domain Layer              │  Adapter Layer
//! ──────────────────────────┼────────────────────────
//! trait BufferStore         │  InMemoryBufferStore
//!   fn increment_by()       │  (Redis hash, ...)
//! trait DurableCounterStore │  InMemoryCounterStore
//!   fn set_count()          │  JsonFileCounterStore
//! ```
//!
//! Both ports are async via return-position `impl Future + Send`, so
//! this crate stays free of `async-trait` and runtime dependencies.

pub mod buffer_store;
pub mod durable_store;
