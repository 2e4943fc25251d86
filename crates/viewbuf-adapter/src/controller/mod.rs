//! Inbound Adapters - Things that drive the use cases

pub mod scheduler;
