//! Shared test doubles for registry integration tests.
//!
//! [`MockConnector`] hands out in-memory transports driven by
//! [`ServerHandle`]s and records every connect attempt, every frame the
//! client sends, and how many transports are open at once.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fanout_stream::api::{GatewayError, JobGroupCanceller};
use fanout_stream::callbacks::GroupCallbacks;
use fanout_stream::config::StreamSettings;
use fanout_stream::reconnect::ReconnectPolicy;
use fanout_stream::registry::JobGroupRegistry;
use fanout_stream::transport::{Connector, StreamError, StreamTransport};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

enum ServerFrame {
    Text(String),
    Error(String),
}

#[derive(Default)]
struct MockState {
    /// Outcomes for upcoming connects; an empty queue means "refuse".
    plans: VecDeque<mpsc::UnboundedReceiver<ServerFrame>>,
    connect_urls: Vec<String>,
    open: usize,
    max_open: usize,
    sent: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept the next connect attempt; the returned handle plays the server.
    pub fn accept_next(&self) -> ServerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().plans.push_back(rx);
        ServerHandle { tx }
    }

    pub fn connect_calls(&self) -> usize {
        self.state.lock().unwrap().connect_urls.len()
    }

    pub fn connect_urls(&self) -> Vec<String> {
        self.state.lock().unwrap().connect_urls.clone()
    }

    pub fn open_connections(&self) -> usize {
        self.state.lock().unwrap().open
    }

    pub fn max_open_connections(&self) -> usize {
        self.state.lock().unwrap().max_open
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamTransport>, StreamError> {
        let mut state = self.state.lock().unwrap();
        state.connect_urls.push(url.to_string());
        match state.plans.pop_front() {
            Some(rx) => {
                state.open += 1;
                state.max_open = state.max_open.max(state.open);
                Ok(Box::new(MockTransport {
                    rx,
                    state: Arc::clone(&self.state),
                    closed: false,
                }))
            }
            None => Err(StreamError::Connect("connection refused".to_string())),
        }
    }
}

/// Server side of one accepted mock connection. Dropping it closes the
/// connection from the server end.
pub struct ServerHandle {
    tx: mpsc::UnboundedSender<ServerFrame>,
}

impl ServerHandle {
    pub fn send(&self, text: &str) {
        let _ = self.tx.send(ServerFrame::Text(text.to_string()));
    }

    pub fn send_error(&self, message: &str) {
        let _ = self.tx.send(ServerFrame::Error(message.to_string()));
    }

    pub fn close(self) {}
}

struct MockTransport {
    rx: mpsc::UnboundedReceiver<ServerFrame>,
    state: Arc<Mutex<MockState>>,
    closed: bool,
}

impl MockTransport {
    fn mark_closed(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().unwrap().open -= 1;
        }
    }
}

#[async_trait]
impl StreamTransport for MockTransport {
    async fn send_text(&mut self, text: &str) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Send("closed".to_string()));
        }
        self.state.lock().unwrap().sent.push(text.to_string());
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<String, StreamError>> {
        if self.closed {
            return None;
        }
        match self.rx.recv().await {
            Some(ServerFrame::Text(text)) => Some(Ok(text)),
            Some(ServerFrame::Error(message)) => Some(Err(StreamError::Receive(message))),
            None => {
                self.mark_closed();
                None
            }
        }
    }

    async fn close(&mut self) {
        self.mark_closed();
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.mark_closed();
    }
}

// ---------------------------------------------------------------------------
// Canceller
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockCanceller {
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockCanceller {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobGroupCanceller for MockCanceller {
    async fn cancel_job_group(&self, job_group_id: &str) -> Result<(), GatewayError> {
        self.calls.lock().unwrap().push(job_group_id.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub struct Harness {
    pub registry: JobGroupRegistry,
    pub connector: MockConnector,
    pub canceller: MockCanceller,
}

pub fn settings() -> StreamSettings {
    StreamSettings {
        endpoint: "http://gateway.test:8000".to_string(),
        keepalive_interval: Duration::from_secs(30),
        reconnect: ReconnectPolicy::default(),
    }
}

pub fn harness() -> Harness {
    harness_with(settings())
}

pub fn harness_with(settings: StreamSettings) -> Harness {
    let connector = MockConnector::new();
    let canceller = MockCanceller::default();
    let registry = JobGroupRegistry::new(
        Arc::new(connector.clone()),
        Arc::new(canceller.clone()),
        settings,
    );
    Harness {
        registry,
        connector,
        canceller,
    }
}

/// Let spawned tasks run until they block, without advancing time.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Callbacks that record a short label for every invocation.
pub fn recording_callbacks() -> (Arc<Mutex<Vec<String>>>, GroupCallbacks) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let push = |log: &Arc<Mutex<Vec<String>>>| {
        let log = Arc::clone(log);
        move |entry: String| log.lock().unwrap().push(entry)
    };

    let (p1, p2, p3, p4, p5, p6, p7, p8, p9, p10) = (
        push(&log),
        push(&log),
        push(&log),
        push(&log),
        push(&log),
        push(&log),
        push(&log),
        push(&log),
        push(&log),
        push(&log),
    );
    let callbacks = GroupCallbacks::new()
        .on_open(move || p1("open".into()))
        .on_close(move || p2("close".into()))
        .on_error(move |e| p3(format!("error:{e}")))
        .on_initial_state(move |g| p4(format!("initial:{}", g.id)))
        .on_child_progress(move |d| p5(format!("progress:{}:{}", d.job_id, d.progress)))
        .on_child_completed(move |d| p6(format!("completed:{}", d.job_id)))
        .on_child_failed(move |d| p7(format!("failed:{}", d.job_id)))
        .on_child_timeout(move |d| p8(format!("timeout:{}", d.job_id)))
        .on_group_complete(move |d| {
            p9(format!(
                "group_complete:{}:{}/{}/{}",
                d.status, d.success_count, d.failure_count, d.total
            ))
        })
        .on_finished(move |end| p10(format!("finished:{end}")));
    (log, callbacks)
}

pub fn entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().unwrap().clone()
}
