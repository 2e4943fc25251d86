//! Domain Models - The vocabulary of viewbuf
//!
//! Every name here should match how we talk about the counters:
//! a counter key, the buffer key it lives under, the reconcile scope.

pub mod counter_key;
pub mod scope;
