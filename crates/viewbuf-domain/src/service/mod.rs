//! Domain Services - Logic that doesn't belong to a single value object
//!
//! No I/O here: services take what the stores returned and decide.

pub mod reconcile_plan;
