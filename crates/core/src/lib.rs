//! Job group data model shared by the stream client and the CLI.
//!
//! Everything here is pure: types, status state machines, the event
//! union exchanged over the job-group stream, and the reconciliation
//! rules that fold those events into caller-visible state.

pub mod error;
pub mod events;
pub mod job_group;
pub mod status;
pub mod submission;
pub mod types;
