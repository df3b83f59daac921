//! Support code for the `fanout` binary: input parsing and run summaries.

pub mod inputs;
pub mod summary;
