//! # viewbuf Shared
//!
//! Configuration and error types used by the viewbuf binary and adapters.

pub mod config;
pub mod error;

// Re-exports
pub use config::*;
pub use error::*;
