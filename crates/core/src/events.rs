//! Job-group stream event types and frame parser.
//!
//! The server sends JSON text frames shaped `{"type": "<kind>", ...}`
//! with the payload fields inlined next to the discriminant. Frames
//! with an unrecognised `type` deserialize to [`StreamEvent::Unknown`]
//! so newer servers do not break older clients.

use serde::{Deserialize, Serialize};

use crate::job_group::{ChildJob, ChildOutputs, JobGroup};
use crate::status::{ChildJobStatus, JobGroupStatus};
use crate::types::{JobGroupId, Timestamp};

/// Payload the client sends as its keepalive probe.
pub const KEEPALIVE_PROBE: &str = "ping";

/// All events the job-group stream can deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Full snapshot of the group, sent when a connection opens.
    InitialState { job_group: JobGroup },

    /// A running child reported progress.
    ChildProgress(ChildProgress),

    /// A child finished and produced outputs.
    ChildCompleted(ChildCompleted),

    /// A child failed.
    ChildFailed(ChildFailed),

    /// A child exceeded the group timeout.
    ChildTimeout(ChildTimeout),

    /// Every child reached a terminal status.
    GroupComplete(GroupComplete),

    /// Acknowledgement of a keepalive probe.
    Pong,

    /// Any discriminant this client does not know about.
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// The wire discriminant, mostly for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InitialState { .. } => "initial_state",
            Self::ChildProgress(_) => "child_progress",
            Self::ChildCompleted(_) => "child_completed",
            Self::ChildFailed(_) => "child_failed",
            Self::ChildTimeout(_) => "child_timeout",
            Self::GroupComplete(_) => "group_complete",
            Self::Pong => "pong",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildProgress {
    pub job_id: String,
    /// Fraction complete in `0.0..=1.0`.
    pub progress: f64,
    pub current_step: Option<String>,
    /// Explicit status, when the server includes one.
    pub status: Option<ChildJobStatus>,
    pub started_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildCompleted {
    pub job_id: String,
    pub outputs: Option<ChildOutputs>,
    pub completed_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildFailed {
    pub job_id: String,
    pub error: String,
    pub error_type: Option<String>,
    pub completed_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildTimeout {
    pub job_id: String,
    pub error: Option<String>,
    pub completed_at: Option<Timestamp>,
}

/// Final per-child results and counts for a finished group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupComplete {
    pub job_group_id: JobGroupId,
    pub status: JobGroupStatus,
    #[serde(default)]
    pub results: Vec<ChildJob>,
    #[serde(alias = "succeeded")]
    pub success_count: u32,
    #[serde(alias = "failed")]
    pub failure_count: u32,
    pub total: u32,
    pub completed_at: Option<Timestamp>,
}

/// Parse one text frame from the job-group stream.
///
/// Returns `Err` for malformed JSON or a known `type` whose payload does
/// not match. Callers log the error and keep the connection open.
pub fn parse_event(text: &str) -> Result<StreamEvent, serde_json::Error> {
    serde_json::from_str(text)
}
