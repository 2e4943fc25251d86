//! # viewbuf Adapter Layer
//!
//! External system integrations (Hexagonal Architecture adapters).
//!
//! ## Structure
//!
//! - `controller/` - Inbound adapters (the reconcile scheduler)
//! - `repository/` - Buffer and durable store implementations

pub mod controller;
pub mod repository;
