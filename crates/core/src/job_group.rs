//! Job group and child job state, and the rules that fold stream events
//! into it.
//!
//! The caller owns a [`JobGroup`]; the stream client only relays
//! [`StreamEvent`]s. [`JobGroup::apply_event`] is the single place where
//! those events update caller-visible state. Status is never derived
//! locally: children advance only on child events, the group only on
//! `initial_state` and `group_complete`.

use serde::{Deserialize, Serialize};

use crate::events::{ChildCompleted, ChildFailed, ChildProgress, ChildTimeout, GroupComplete, StreamEvent};
use crate::status::{ChildJobStatus, JobGroupStatus, SeedStrategy};
use crate::types::{JobGroupId, Timestamp};

/// One generated image as reported by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputImage {
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Outputs of a completed child job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChildOutputs {
    #[serde(default)]
    pub images: Vec<OutputImage>,
    /// Backend execution time in seconds.
    pub execution_time: Option<f64>,
}

/// One backend's execution within a job group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildJob {
    pub job_id: String,
    pub backend_id: String,
    #[serde(default)]
    pub seed: i64,
    #[serde(default)]
    pub status: ChildJobStatus,
    /// Fraction complete in `0.0..=1.0`.
    #[serde(default)]
    pub progress: f64,
    pub current_step: Option<String>,
    pub outputs: Option<ChildOutputs>,
    pub error: Option<String>,
    pub error_type: Option<String>,
    pub queued_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

/// One user-initiated generation request fanned out to several backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobGroup {
    #[serde(alias = "job_group_id")]
    pub id: JobGroupId,
    pub panel_id: Option<String>,
    /// Children in submission order.
    #[serde(default)]
    pub child_jobs: Vec<ChildJob>,
    #[serde(default)]
    pub status: JobGroupStatus,
    #[serde(default)]
    pub seed_strategy: SeedStrategy,
    pub base_seed: Option<i64>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// Group timeout used when the submitter does not specify one.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 600;

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

/// Per-status tallies of a group's children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCounts {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub pending: u32,
    #[serde(default)]
    pub running: u32,
    #[serde(default)]
    pub succeeded: u32,
    #[serde(default)]
    pub failed: u32,
}

/// Whether an event changed local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Ignored,
}

impl ApplyOutcome {
    fn from_changed(changed: bool) -> Self {
        if changed {
            Self::Applied
        } else {
            Self::Ignored
        }
    }
}

// ---------------------------------------------------------------------------
// ChildJob
// ---------------------------------------------------------------------------

impl ChildJob {
    /// A freshly submitted child with no progress.
    pub fn pending(job_id: impl Into<String>, backend_id: impl Into<String>, seed: i64) -> Self {
        Self {
            job_id: job_id.into(),
            backend_id: backend_id.into(),
            seed,
            status: ChildJobStatus::Pending,
            progress: 0.0,
            current_step: None,
            outputs: None,
            error: None,
            error_type: None,
            queued_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn advance(&mut self, next: ChildJobStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    fn apply_progress(&mut self, data: &ChildProgress) -> bool {
        if self.is_terminal() {
            return false;
        }
        let next = match data.status {
            Some(status) if !status.is_terminal() => status,
            _ => ChildJobStatus::Running,
        };
        self.advance(next);
        self.progress = data.progress.clamp(0.0, 1.0);
        self.current_step = data.current_step.clone();
        if self.started_at.is_none() {
            self.started_at = data.started_at;
        }
        true
    }

    fn apply_completed(&mut self, data: &ChildCompleted) -> bool {
        if !self.advance(ChildJobStatus::Completed) {
            return false;
        }
        self.progress = 1.0;
        self.current_step = None;
        self.outputs = data.outputs.clone();
        self.completed_at = data.completed_at;
        true
    }

    fn apply_failed(&mut self, data: &ChildFailed) -> bool {
        if !self.advance(ChildJobStatus::Failed) {
            return false;
        }
        self.current_step = None;
        self.error = Some(data.error.clone());
        self.error_type = data.error_type.clone();
        self.completed_at = data.completed_at;
        true
    }

    fn apply_timeout(&mut self, data: &ChildTimeout) -> bool {
        if !self.advance(ChildJobStatus::Timeout) {
            return false;
        }
        self.current_step = None;
        self.error = data.error.clone();
        self.error_type = Some("timeout".to_string());
        self.completed_at = data.completed_at;
        true
    }

    /// Merge a server-side copy of this child. Terminal local state wins;
    /// otherwise the remote copy is taken when it is at least as far along.
    /// Progress never moves backwards within the same status.
    fn merge_from(&mut self, remote: &ChildJob) -> bool {
        if self.is_terminal() {
            return false;
        }
        let same_status = remote.status == self.status;
        if !same_status && !self.status.can_transition_to(remote.status) {
            return false;
        }
        let mut merged = remote.clone();
        if same_status {
            merged.progress = merged.progress.max(self.progress);
            if merged.started_at.is_none() {
                merged.started_at = self.started_at;
            }
        }
        let changed = *self != merged;
        *self = merged;
        changed
    }
}

// ---------------------------------------------------------------------------
// JobGroup
// ---------------------------------------------------------------------------

impl JobGroup {
    pub fn child(&self, job_id: &str) -> Option<&ChildJob> {
        self.child_jobs.iter().find(|c| c.job_id == job_id)
    }

    fn child_mut(&mut self, job_id: &str) -> Option<&mut ChildJob> {
        self.child_jobs.iter_mut().find(|c| c.job_id == job_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn counts(&self) -> GroupCounts {
        let mut counts = GroupCounts {
            total: self.child_jobs.len() as u32,
            ..Default::default()
        };
        for child in &self.child_jobs {
            match child.status {
                ChildJobStatus::Pending | ChildJobStatus::Queued => counts.pending += 1,
                ChildJobStatus::Running => counts.running += 1,
                ChildJobStatus::Completed => counts.succeeded += 1,
                ChildJobStatus::Failed | ChildJobStatus::Timeout | ChildJobStatus::Cancelled => {
                    counts.failed += 1
                }
            }
        }
        counts
    }

    /// Fold one stream event into this group.
    ///
    /// Events addressed to unknown children, events for children that
    /// are already terminal, and snapshots for other groups are ignored.
    pub fn apply_event(&mut self, event: &StreamEvent) -> ApplyOutcome {
        let changed = match event {
            StreamEvent::InitialState { job_group } => self.merge_snapshot(job_group),
            StreamEvent::ChildProgress(data) => self
                .child_mut(&data.job_id)
                .is_some_and(|c| c.apply_progress(data)),
            StreamEvent::ChildCompleted(data) => self
                .child_mut(&data.job_id)
                .is_some_and(|c| c.apply_completed(data)),
            StreamEvent::ChildFailed(data) => self
                .child_mut(&data.job_id)
                .is_some_and(|c| c.apply_failed(data)),
            StreamEvent::ChildTimeout(data) => self
                .child_mut(&data.job_id)
                .is_some_and(|c| c.apply_timeout(data)),
            StreamEvent::GroupComplete(data) => self.apply_group_complete(data),
            StreamEvent::Pong | StreamEvent::Unknown => false,
        };
        ApplyOutcome::from_changed(changed)
    }

    fn merge_children(&mut self, remote: &[ChildJob]) -> bool {
        let mut changed = false;
        for remote_child in remote {
            match self.child_mut(&remote_child.job_id) {
                Some(local) => changed |= local.merge_from(remote_child),
                None => {
                    self.child_jobs.push(remote_child.clone());
                    changed = true;
                }
            }
        }
        changed
    }

    fn advance(&mut self, next: JobGroupStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    fn merge_snapshot(&mut self, snapshot: &JobGroup) -> bool {
        if snapshot.id != self.id {
            return false;
        }
        let mut changed = self.merge_children(&snapshot.child_jobs);
        if self.advance(snapshot.status) {
            self.completed_at = snapshot.completed_at;
            changed = true;
        }
        changed
    }

    fn apply_group_complete(&mut self, data: &GroupComplete) -> bool {
        if data.job_group_id != self.id {
            return false;
        }
        let mut changed = self.merge_children(&data.results);
        if self.advance(data.status) {
            self.completed_at = data.completed_at;
            changed = true;
        }
        changed
    }
}
