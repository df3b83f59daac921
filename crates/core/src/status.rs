//! Status enums and their state machines.
//!
//! Both machines only move forward. A status carries a rank and a
//! transition is legal when the current status is not terminal and the
//! next rank is strictly greater. Intermediate states may be skipped:
//! the server is authoritative and events can be missed while a stream
//! is reconnecting.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// JobGroupStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a whole job group.
///
/// `pending -> running -> {partial_complete, completed, failed, cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobGroupStatus {
    #[default]
    Pending,
    Running,
    PartialComplete,
    Completed,
    Failed,
    Cancelled,
}

impl JobGroupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::PartialComplete => "partial_complete",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::PartialComplete | Self::Completed | Self::Failed | Self::Cancelled
        )
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            _ => 2,
        }
    }

    /// Whether moving from `self` to `next` is a forward move.
    pub fn can_transition_to(self, next: Self) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    /// Like [`can_transition_to`](Self::can_transition_to), returning the
    /// rejection as a [`CoreError::InvalidTransition`].
    pub fn transition(self, next: Self) -> Result<Self, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for JobGroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobGroupStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "partial_complete" => Ok(Self::PartialComplete),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::UnknownVariant {
                kind: "job group status",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ChildJobStatus
// ---------------------------------------------------------------------------

/// Lifecycle of one backend's execution within a group.
///
/// `pending -> queued -> running -> {completed, failed, timeout, cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildJobStatus {
    #[default]
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl ChildJobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Timeout | Self::Cancelled
        )
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Queued => 1,
            Self::Running => 2,
            _ => 3,
        }
    }

    /// Whether moving from `self` to `next` is a forward move.
    pub fn can_transition_to(self, next: Self) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn transition(self, next: Self) -> Result<Self, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for ChildJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChildJobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "timeout" => Ok(Self::Timeout),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::UnknownVariant {
                kind: "child job status",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// SeedStrategy
// ---------------------------------------------------------------------------

/// How the server derives per-child seeds from the optional base seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedStrategy {
    #[default]
    Random,
    Sequential,
    Fibonacci,
    GoldenRatio,
}

impl SeedStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Sequential => "sequential",
            Self::Fibonacci => "fibonacci",
            Self::GoldenRatio => "golden_ratio",
        }
    }
}

impl fmt::Display for SeedStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeedStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(Self::Random),
            "sequential" => Ok(Self::Sequential),
            "fibonacci" => Ok(Self::Fibonacci),
            "golden_ratio" => Ok(Self::GoldenRatio),
            other => Err(CoreError::UnknownVariant {
                kind: "seed strategy",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    // -- JobGroupStatus -------------------------------------------------------

    #[test]
    fn group_terminal_states() {
        assert!(!JobGroupStatus::Pending.is_terminal());
        assert!(!JobGroupStatus::Running.is_terminal());
        assert!(JobGroupStatus::PartialComplete.is_terminal());
        assert!(JobGroupStatus::Completed.is_terminal());
        assert!(JobGroupStatus::Failed.is_terminal());
        assert!(JobGroupStatus::Cancelled.is_terminal());
    }

    #[test]
    fn group_moves_forward_only() {
        use JobGroupStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(PartialComplete));
        assert!(Running.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Running.can_transition_to(Running));
    }

    #[test]
    fn group_terminal_is_final() {
        use JobGroupStatus::*;
        for terminal in [PartialComplete, Completed, Failed, Cancelled] {
            for next in [Pending, Running, PartialComplete, Completed, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn group_transition_reports_rejection() {
        let err = JobGroupStatus::Completed
            .transition(JobGroupStatus::Running)
            .unwrap_err();
        assert_matches!(
            err,
            CoreError::InvalidTransition { ref from, ref to } if from == "completed" && to == "running"
        );
    }

    // -- ChildJobStatus -------------------------------------------------------

    #[test]
    fn child_happy_path() {
        use ChildJobStatus::*;
        assert_eq!(Pending.transition(Queued).unwrap(), Queued);
        assert_eq!(Queued.transition(Running).unwrap(), Running);
        assert_eq!(Running.transition(Completed).unwrap(), Completed);
    }

    #[test]
    fn child_may_skip_missed_states() {
        use ChildJobStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Queued.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Cancelled));
    }

    #[test]
    fn child_never_regresses() {
        use ChildJobStatus::*;
        assert!(!Running.can_transition_to(Queued));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Timeout.can_transition_to(Completed));
    }

    // -- string forms ---------------------------------------------------------

    #[test]
    fn status_strings_match_wire_format() {
        let json = serde_json::to_string(&JobGroupStatus::PartialComplete).unwrap();
        assert_eq!(json, "\"partial_complete\"");
        assert_eq!(
            "partial_complete".parse::<JobGroupStatus>().unwrap(),
            JobGroupStatus::PartialComplete
        );
        assert_eq!("timeout".parse::<ChildJobStatus>().unwrap(), ChildJobStatus::Timeout);
    }

    #[test]
    fn seed_strategy_parses() {
        assert_eq!(
            "golden_ratio".parse::<SeedStrategy>().unwrap(),
            SeedStrategy::GoldenRatio
        );
        assert_eq!(SeedStrategy::Fibonacci.to_string(), "fibonacci");
        assert_matches!(
            "lucky".parse::<SeedStrategy>(),
            Err(CoreError::UnknownVariant { kind: "seed strategy", .. })
        );
    }
}
