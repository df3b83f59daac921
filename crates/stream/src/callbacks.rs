//! Subscriber callbacks for one tracked job group.
//!
//! A [`GroupCallbacks`] value is handed to
//! [`JobGroupRegistry::connect`](crate::registry::JobGroupRegistry::connect)
//! and kept for the lifetime of the registry entry, so reconnects keep
//! delivering to the original subscriber. Callers who prefer a channel
//! can use [`GroupCallbacks::channel`] instead of writing handlers.

use std::fmt;
use std::sync::Arc;

use fanout_core::events::{
    ChildCompleted, ChildFailed, ChildProgress, ChildTimeout, GroupComplete, StreamEvent,
};
use fanout_core::job_group::JobGroup;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::transport::StreamError;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;
type Notify = Arc<dyn Fn() + Send + Sync>;

/// Everything a subscriber can observe on a group's stream, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupSignal {
    /// A connection opened (initially or after a reconnect).
    Opened,
    /// An event arrived.
    Event(StreamEvent),
    /// The connection closed for a reason other than a caller disconnect.
    Closed,
    /// A transport error was reported.
    Error(String),
    /// The stream ended for good; no further signals follow.
    Finished(StreamEnd),
}

/// Why a group's stream stopped without the caller disconnecting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server reported `group_complete`; the stream was torn down.
    GroupComplete,
    /// Reconnection gave up. The group's outcome must be fetched from the
    /// gateway.
    GaveUp,
}

impl StreamEnd {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GroupComplete => "group_complete",
            Self::GaveUp => "gave_up",
        }
    }
}

impl fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional handlers for stream events and connection lifecycle.
#[derive(Clone, Default)]
pub struct GroupCallbacks {
    on_event: Option<Handler<StreamEvent>>,
    on_initial_state: Option<Handler<JobGroup>>,
    on_child_progress: Option<Handler<ChildProgress>>,
    on_child_completed: Option<Handler<ChildCompleted>>,
    on_child_failed: Option<Handler<ChildFailed>>,
    on_child_timeout: Option<Handler<ChildTimeout>>,
    on_group_complete: Option<Handler<GroupComplete>>,
    on_open: Option<Notify>,
    on_close: Option<Notify>,
    on_error: Option<Handler<StreamError>>,
    on_finished: Option<Handler<StreamEnd>>,
}

impl GroupCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callbacks that forward every signal into an unbounded channel.
    ///
    /// The receiver sees signals in exactly the order the connection task
    /// produced them.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GroupSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let event_tx = tx.clone();
        let open_tx = tx.clone();
        let close_tx = tx.clone();
        let error_tx = tx.clone();
        let callbacks = Self::new()
            .on_event(move |event| {
                let _ = event_tx.send(GroupSignal::Event(event.clone()));
            })
            .on_open(move || {
                let _ = open_tx.send(GroupSignal::Opened);
            })
            .on_close(move || {
                let _ = close_tx.send(GroupSignal::Closed);
            })
            .on_error(move |error| {
                let _ = error_tx.send(GroupSignal::Error(error.to_string()));
            })
            .on_finished(move |end| {
                let _ = tx.send(GroupSignal::Finished(*end));
            });
        (callbacks, rx)
    }

    /// Called for every event, before the event-specific handler.
    pub fn on_event(mut self, f: impl Fn(&StreamEvent) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Arc::new(f));
        self
    }

    pub fn on_initial_state(mut self, f: impl Fn(&JobGroup) + Send + Sync + 'static) -> Self {
        self.on_initial_state = Some(Arc::new(f));
        self
    }

    pub fn on_child_progress(mut self, f: impl Fn(&ChildProgress) + Send + Sync + 'static) -> Self {
        self.on_child_progress = Some(Arc::new(f));
        self
    }

    pub fn on_child_completed(
        mut self,
        f: impl Fn(&ChildCompleted) + Send + Sync + 'static,
    ) -> Self {
        self.on_child_completed = Some(Arc::new(f));
        self
    }

    pub fn on_child_failed(mut self, f: impl Fn(&ChildFailed) + Send + Sync + 'static) -> Self {
        self.on_child_failed = Some(Arc::new(f));
        self
    }

    pub fn on_child_timeout(mut self, f: impl Fn(&ChildTimeout) + Send + Sync + 'static) -> Self {
        self.on_child_timeout = Some(Arc::new(f));
        self
    }

    pub fn on_group_complete(
        mut self,
        f: impl Fn(&GroupComplete) + Send + Sync + 'static,
    ) -> Self {
        self.on_group_complete = Some(Arc::new(f));
        self
    }

    pub fn on_open(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Arc::new(f));
        self
    }

    pub fn on_close(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&StreamError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Called once when the stream stops on its own: the group completed
    /// or reconnection gave up.
    pub fn on_finished(mut self, f: impl Fn(&StreamEnd) + Send + Sync + 'static) -> Self {
        self.on_finished = Some(Arc::new(f));
        self
    }

    // ---- dispatch (called by the connection task) ----

    /// Invoke the generic handler, then the one matching the discriminant.
    ///
    /// Stops as soon as `cancel` fires, so a handler that disconnects its
    /// own group suppresses the handlers after it.
    pub(crate) fn dispatch(&self, event: &StreamEvent, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }
        if let Some(f) = &self.on_event {
            f(event);
        }
        if cancel.is_cancelled() {
            return;
        }
        match event {
            StreamEvent::InitialState { job_group } => {
                if let Some(f) = &self.on_initial_state {
                    f(job_group);
                }
            }
            StreamEvent::ChildProgress(data) => {
                if let Some(f) = &self.on_child_progress {
                    f(data);
                }
            }
            StreamEvent::ChildCompleted(data) => {
                if let Some(f) = &self.on_child_completed {
                    f(data);
                }
            }
            StreamEvent::ChildFailed(data) => {
                if let Some(f) = &self.on_child_failed {
                    f(data);
                }
            }
            StreamEvent::ChildTimeout(data) => {
                if let Some(f) = &self.on_child_timeout {
                    f(data);
                }
            }
            StreamEvent::GroupComplete(data) => {
                if let Some(f) = &self.on_group_complete {
                    f(data);
                }
            }
            StreamEvent::Pong | StreamEvent::Unknown => {}
        }
    }

    pub(crate) fn opened(&self) {
        if let Some(f) = &self.on_open {
            f();
        }
    }

    pub(crate) fn closed(&self) {
        if let Some(f) = &self.on_close {
            f();
        }
    }

    pub(crate) fn error(&self, error: &StreamError) {
        if let Some(f) = &self.on_error {
            f(error);
        }
    }

    pub(crate) fn finished(&self, end: StreamEnd) {
        if let Some(f) = &self.on_finished {
            f(&end);
        }
    }
}

impl fmt::Debug for GroupCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupCallbacks")
            .field("on_event", &self.on_event.is_some())
            .field("on_initial_state", &self.on_initial_state.is_some())
            .field("on_child_progress", &self.on_child_progress.is_some())
            .field("on_child_completed", &self.on_child_completed.is_some())
            .field("on_child_failed", &self.on_child_failed.is_some())
            .field("on_child_timeout", &self.on_child_timeout.is_some())
            .field("on_group_complete", &self.on_group_complete.is_some())
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_finished", &self.on_finished.is_some())
            .finish()
    }
}
