//! Multiplexed job-group stream registry.
//!
//! [`JobGroupRegistry`] tracks any number of job groups, each with at
//! most one live stream connection. Every connect cycle runs as its own
//! tokio task (connect -> process -> reconnect) that owns the transport,
//! the keepalive timer and the backoff sleep for that group.
//!
//! Per-group bookkeeping (saved callbacks, attempt counter, intentional
//! close flag, connection state) lives in a shared map. The map lock is
//! never held across an `.await` or while a callback runs. Each cycle
//! carries a generation number and a [`CancellationToken`]; a task only
//! touches the entry whose generation matches its own, so a superseded
//! or disconnected cycle can never mutate state or invoke callbacks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{GatewayError, JobGroupApi, JobGroupCanceller};
use crate::callbacks::{GroupCallbacks, StreamEnd};
use crate::config::{stream_url, StreamSettings};
use crate::connection::{run_session, SessionEnd};
use crate::transport::{Connector, WsConnector};

/// How long [`JobGroupRegistry::disconnect_all`] waits for each task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection state of one tracked group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The group is not tracked.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The stream is open.
    Connected,
    /// The stream closed and a reconnect timer is pending.
    ReconnectScheduled,
    /// Closed by the caller, the group completed, or reconnection gave up.
    Closed,
}

type GroupMap = Arc<Mutex<HashMap<String, GroupEntry>>>;

/// Internal bookkeeping for a single tracked group.
struct GroupEntry {
    /// Saved so reconnects deliver to the original subscriber.
    callbacks: Arc<GroupCallbacks>,
    /// Consecutive failed connects since the last successful open.
    attempts: u32,
    /// Set by `disconnect`; suppresses reconnection until the next `connect`.
    intentionally_closed: bool,
    state: ConnectionState,
    generation: u64,
    /// Cancels this connect cycle.
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Tracks live event streams for many job groups.
///
/// Construct once at startup and share by reference (or `Arc`) with every
/// call site that tracks groups. Operations on different group ids never
/// interfere with each other.
pub struct JobGroupRegistry {
    groups: GroupMap,
    connector: Arc<dyn Connector>,
    canceller: Arc<dyn JobGroupCanceller>,
    settings: Arc<StreamSettings>,
    next_generation: AtomicU64,
}

impl JobGroupRegistry {
    pub fn new(
        connector: Arc<dyn Connector>,
        canceller: Arc<dyn JobGroupCanceller>,
        settings: StreamSettings,
    ) -> Self {
        Self {
            groups: Arc::new(Mutex::new(HashMap::new())),
            connector,
            canceller,
            settings: Arc::new(settings),
            next_generation: AtomicU64::new(0),
        }
    }

    /// A registry that streams over WebSocket and cancels through `api`.
    pub fn websocket(api: Arc<JobGroupApi>, settings: StreamSettings) -> Self {
        Self::new(Arc::new(WsConnector::new()), api, settings)
    }

    /// Start tracking `job_group_id`, replacing any existing connection.
    ///
    /// The previous connect cycle for the group (if any) is cancelled
    /// before this returns, and the new cycle waits for it to finish
    /// before opening, so at most one connection per group is ever open.
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, job_group_id: &str, callbacks: GroupCallbacks) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let callbacks = Arc::new(callbacks);

        let mut groups = lock(&self.groups);

        let previous = groups.remove(job_group_id).and_then(|mut old| {
            old.cancel.cancel();
            old.task.take()
        });
        if previous.is_some() {
            tracing::info!(job_group_id, "Replacing existing job group connection");
        }

        let task = GroupTask {
            job_group_id: job_group_id.to_string(),
            generation,
            cancel: cancel.clone(),
            callbacks: Arc::clone(&callbacks),
            groups: Arc::clone(&self.groups),
            connector: Arc::clone(&self.connector),
            settings: Arc::clone(&self.settings),
        };
        let handle = tokio::spawn(task.run(previous));

        groups.insert(
            job_group_id.to_string(),
            GroupEntry {
                callbacks,
                attempts: 0,
                intentionally_closed: false,
                state: ConnectionState::Connecting,
                generation,
                cancel,
                task: Some(handle),
            },
        );
    }

    /// Stop streaming `job_group_id` without forgetting it.
    ///
    /// Pending reconnect timers and the live connection are cancelled
    /// before this returns. Saved callbacks and the attempt counter are
    /// kept. Idempotent.
    ///
    /// Called from a callback or from a task on the same current-thread
    /// runtime, no further callback for the group fires. Called from
    /// another thread, a callback whose cancellation check already passed
    /// may still be running or about to run; at most that one invocation
    /// completes, and nothing is dispatched after it.
    pub fn disconnect(&self, job_group_id: &str) {
        let mut groups = lock(&self.groups);
        if let Some(entry) = groups.get_mut(job_group_id) {
            entry.intentionally_closed = true;
            entry.cancel.cancel();
            entry.state = ConnectionState::Closed;
            tracing::info!(job_group_id, "Disconnected from job group stream");
        }
    }

    /// Disconnect, then ask the gateway to cancel the group.
    ///
    /// Disconnecting first guarantees no reconnect attempt races with the
    /// cancel call. Gateway failures are returned to the caller.
    pub async fn cancel_and_disconnect(&self, job_group_id: &str) -> Result<(), GatewayError> {
        self.disconnect(job_group_id);
        self.canceller.cancel_job_group(job_group_id).await
    }

    /// Whether `job_group_id` has an open stream right now.
    pub fn is_connected(&self, job_group_id: &str) -> bool {
        self.connection_state(job_group_id) == ConnectionState::Connected
    }

    pub fn connection_state(&self, job_group_id: &str) -> ConnectionState {
        lock(&self.groups)
            .get(job_group_id)
            .map_or(ConnectionState::Disconnected, |entry| entry.state)
    }

    /// Consecutive failed connects since the last successful open.
    pub fn reconnect_attempts(&self, job_group_id: &str) -> Option<u32> {
        lock(&self.groups)
            .get(job_group_id)
            .map(|entry| entry.attempts)
    }

    /// Reset the attempt counter without touching the connection.
    ///
    /// Used after a manual out-of-band reconnect so the next automatic
    /// backoff starts fresh.
    pub fn reset_reconnect_attempts(&self, job_group_id: &str) {
        if let Some(entry) = lock(&self.groups).get_mut(job_group_id) {
            entry.attempts = 0;
        }
    }

    /// Ids of every tracked group, sorted.
    pub fn tracked_groups(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.groups).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Close every stream and forget all per-group state.
    ///
    /// Waits up to five seconds per task for a clean exit. Intended for
    /// process teardown.
    pub async fn disconnect_all(&self) {
        let drained: Vec<(String, GroupEntry)> = lock(&self.groups).drain().collect();
        tracing::info!(count = drained.len(), "Disconnecting all job group streams");

        for (job_group_id, mut entry) in drained {
            entry.intentionally_closed = true;
            entry.cancel.cancel();
            if let Some(task) = entry.task.take() {
                if tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err() {
                    tracing::warn!(job_group_id = %job_group_id, "Stream task did not exit in time");
                }
            }
        }
    }
}

impl Drop for JobGroupRegistry {
    fn drop(&mut self) {
        for entry in lock(&self.groups).values() {
            entry.cancel.cancel();
        }
    }
}

fn lock(groups: &Mutex<HashMap<String, GroupEntry>>) -> MutexGuard<'_, HashMap<String, GroupEntry>> {
    groups.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Per-group connection task
// ---------------------------------------------------------------------------

/// Everything one connect cycle needs, moved into its task.
struct GroupTask {
    job_group_id: String,
    generation: u64,
    cancel: CancellationToken,
    callbacks: Arc<GroupCallbacks>,
    groups: GroupMap,
    connector: Arc<dyn Connector>,
    settings: Arc<StreamSettings>,
}

impl GroupTask {
    /// Core loop: connect -> process frames -> back off -> reconnect.
    ///
    /// Runs until the cycle is cancelled, the group completes, or the
    /// reconnect policy gives up.
    async fn run(self, previous: Option<JoinHandle<()>>) {
        if let Some(previous) = previous {
            let _ = previous.await;
        }

        let job_group_id = self.job_group_id.as_str();
        let url = stream_url(&self.settings.endpoint, job_group_id);

        loop {
            if !self.with_entry(|entry| entry.state = ConnectionState::Connecting) {
                return;
            }
            tracing::info!(job_group_id, url = %url, "Connecting to job group stream");

            let connected = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                result = self.connector.connect(&url) => result,
            };

            match connected {
                Ok(mut transport) => {
                    if !self.mark_open() {
                        transport.close().await;
                        return;
                    }
                    let end = run_session(
                        transport.as_mut(),
                        job_group_id,
                        &self.callbacks,
                        &self.cancel,
                        self.settings.keepalive_interval,
                    )
                    .await;
                    match end {
                        SessionEnd::Cancelled => return,
                        SessionEnd::GroupComplete => {
                            self.finish_complete();
                            return;
                        }
                        SessionEnd::Closed => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(job_group_id, error = %e, "Job group stream connect failed");
                    if !self.cancel.is_cancelled() {
                        self.callbacks.error(&e);
                    }
                }
            }

            let Some(delay) = self.on_closed() else {
                return;
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Run `f` on this cycle's entry if the cycle is still current.
    fn with_entry(&self, f: impl FnOnce(&mut GroupEntry)) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let mut groups = lock(&self.groups);
        match groups.get_mut(&self.job_group_id) {
            Some(entry) if entry.generation == self.generation => {
                f(entry);
                true
            }
            _ => false,
        }
    }

    /// Open signal: reset the attempt counter and notify the subscriber.
    fn mark_open(&self) -> bool {
        let current = self.with_entry(|entry| {
            entry.attempts = 0;
            entry.state = ConnectionState::Connected;
        });
        if current {
            tracing::info!(job_group_id = %self.job_group_id, "Job group stream connected");
            self.callbacks.opened();
        }
        current && !self.cancel.is_cancelled()
    }

    /// The group completed: never reconnect this cycle, then tell the
    /// subscriber the stream is over.
    fn finish_complete(&self) {
        let current = self.with_entry(|entry| {
            entry.intentionally_closed = true;
            entry.state = ConnectionState::Closed;
        });
        if current {
            self.callbacks.finished(StreamEnd::GroupComplete);
        }
    }

    /// Close signal: notify the subscriber, then decide whether to retry.
    ///
    /// Returns the backoff delay, or `None` when the cycle should end.
    fn on_closed(&self) -> Option<Duration> {
        if !self.with_entry(|entry| entry.state = ConnectionState::Closed) {
            return None;
        }
        self.callbacks.closed();

        let policy = &self.settings.reconnect;
        let mut decision = None;
        let mut gave_up = false;
        self.with_entry(|entry| {
            if entry.intentionally_closed {
                return;
            }
            if policy.should_give_up(entry.attempts) {
                tracing::warn!(
                    job_group_id = %self.job_group_id,
                    attempts = entry.attempts,
                    "Reconnect attempts exhausted, giving up",
                );
                gave_up = true;
                return;
            }
            let delay = policy.delay_for_attempt(entry.attempts);
            entry.attempts += 1;
            entry.state = ConnectionState::ReconnectScheduled;
            tracing::info!(
                job_group_id = %self.job_group_id,
                attempt = entry.attempts,
                delay_ms = delay.as_millis() as u64,
                "Scheduling job group stream reconnect",
            );
            decision = Some(delay);
        });
        if gave_up && !self.cancel.is_cancelled() {
            self.callbacks.finished(StreamEnd::GaveUp);
        }
        decision
    }
}
