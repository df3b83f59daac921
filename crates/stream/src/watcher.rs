//! Caller-side view of one job group, kept current from its stream.

use fanout_core::job_group::{ApplyOutcome, JobGroup};
use tokio::sync::mpsc;

use crate::callbacks::{GroupCallbacks, GroupSignal, StreamEnd};
use crate::registry::JobGroupRegistry;

/// Owns a [`JobGroup`] and folds stream events into it as they arrive.
///
/// Uses the channel form of [`GroupCallbacks`], so events are applied
/// strictly in the order the connection received them.
pub struct GroupWatcher {
    group: JobGroup,
    signals: mpsc::UnboundedReceiver<GroupSignal>,
    finished: Option<StreamEnd>,
}

impl GroupWatcher {
    /// Connect `group` through `registry` and start watching it.
    pub fn attach(registry: &JobGroupRegistry, group: JobGroup) -> Self {
        let (callbacks, signals) = GroupCallbacks::channel();
        registry.connect(&group.id, callbacks);
        Self {
            group,
            signals,
            finished: None,
        }
    }

    pub fn group(&self) -> &JobGroup {
        &self.group
    }

    pub fn into_group(self) -> JobGroup {
        self.group
    }

    /// Why the stream ended on its own, once it has.
    ///
    /// [`StreamEnd::GaveUp`] means the local group may be stale; its true
    /// outcome has to be fetched from the gateway.
    pub fn finished(&self) -> Option<StreamEnd> {
        self.finished
    }

    /// Receive the next signal, applying it to the group first if it is an
    /// event. Returns `None` once the registry forgets the group, and after
    /// a [`GroupSignal::Finished`] has been returned.
    pub async fn next(&mut self) -> Option<GroupSignal> {
        if self.finished.is_some() {
            return None;
        }
        let signal = self.signals.recv().await?;
        if let GroupSignal::Finished(end) = &signal {
            self.finished = Some(*end);
        }
        if let GroupSignal::Event(event) = &signal {
            if self.group.apply_event(event) == ApplyOutcome::Applied {
                tracing::debug!(
                    job_group_id = %self.group.id,
                    event = event.kind(),
                    status = %self.group.status,
                    "Job group state updated",
                );
            }
        }
        Some(signal)
    }

    /// Drive the watcher until the group reaches a terminal status, the
    /// stream finishes, or the signal channel ends. Returns the latest
    /// known state.
    pub async fn until_complete(mut self) -> JobGroup {
        while !self.group.is_terminal() {
            if self.next().await.is_none() {
                break;
            }
        }
        self.group
    }
}
