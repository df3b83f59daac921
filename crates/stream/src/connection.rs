//! One open job-group stream: frame processing and keepalive.
//!
//! [`run_session`] drives a single open transport until it closes or the
//! group's connect cycle is cancelled. Text frames are parsed into
//! [`StreamEvent`]s and dispatched to the group's callbacks in receive
//! order; a keepalive probe is sent on a fixed period while the
//! connection stays open.

use std::time::Duration;

use fanout_core::events::{parse_event, StreamEvent, KEEPALIVE_PROBE};
use tokio_util::sync::CancellationToken;

use crate::callbacks::GroupCallbacks;
use crate::keepalive::KeepaliveTimer;
use crate::transport::StreamTransport;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The connect cycle was cancelled by the caller; the transport was
    /// closed locally.
    Cancelled,
    /// The transport closed (server close, network failure, or error).
    Closed,
    /// The server reported `group_complete` for this group; the transport
    /// was closed locally.
    GroupComplete,
}

/// Process frames from an open transport until it closes or `cancel` fires.
///
/// The keepalive timer lives only as long as this call, so it is started
/// exactly when the connection opens and stopped exactly when it closes.
pub async fn run_session(
    transport: &mut dyn StreamTransport,
    job_group_id: &str,
    callbacks: &GroupCallbacks,
    cancel: &CancellationToken,
    keepalive_interval: Duration,
) -> SessionEnd {
    let mut keepalive = KeepaliveTimer::start(keepalive_interval);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                transport.close().await;
                tracing::debug!(job_group_id, "Session cancelled, transport closed");
                return SessionEnd::Cancelled;
            }
            frame = transport.next_frame() => {
                match frame {
                    Some(Ok(text)) => {
                        if handle_text_frame(&text, job_group_id, callbacks, cancel) {
                            transport.close().await;
                            if cancel.is_cancelled() {
                                return SessionEnd::Cancelled;
                            }
                            tracing::info!(job_group_id, "Job group complete, stream closed");
                            return SessionEnd::GroupComplete;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(job_group_id, error = %e, "Stream transport error");
                        if !cancel.is_cancelled() {
                            callbacks.error(&e);
                        }
                    }
                    None => {
                        tracing::info!(job_group_id, "Job group stream closed");
                        return SessionEnd::Closed;
                    }
                }
            }
            _ = keepalive.tick() => {
                tracing::debug!(job_group_id, "Sending keepalive probe");
                if let Err(e) = transport.send_text(KEEPALIVE_PROBE).await {
                    // Disconnects surface through the transport's own close.
                    tracing::warn!(job_group_id, error = %e, "Failed to send keepalive probe");
                }
            }
        }
    }
}

/// Parse and dispatch one text frame. Malformed frames are logged and
/// dropped without affecting the connection.
///
/// Returns `true` when the frame was a terminal `group_complete` for
/// this group.
fn handle_text_frame(
    text: &str,
    job_group_id: &str,
    callbacks: &GroupCallbacks,
    cancel: &CancellationToken,
) -> bool {
    match parse_event(text) {
        Ok(StreamEvent::Unknown) => {
            tracing::debug!(job_group_id, raw_message = %text, "Ignoring unknown event type");
            false
        }
        Ok(event) => {
            tracing::debug!(job_group_id, event = event.kind(), "Job group event");
            callbacks.dispatch(&event, cancel);
            matches!(
                &event,
                StreamEvent::GroupComplete(data)
                    if data.job_group_id == job_group_id && data.status.is_terminal()
            )
        }
        Err(e) => {
            tracing::warn!(
                job_group_id,
                error = %e,
                raw_message = %text,
                "Failed to parse job group event",
            );
            false
        }
    }
}
