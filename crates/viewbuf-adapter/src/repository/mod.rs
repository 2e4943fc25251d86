//! Persistence Adapters - Store implementations
//!
//! These implement the store traits from viewbuf-domain.

pub mod in_memory;
pub mod json_file;
