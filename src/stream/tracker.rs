// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Event stream tracking.
//!
//! [`EventTracker::track`] turns a chunked byte stream into a lazy stream of
//! [`StreamEvent`]s. Every event is appended to the monitor's event log as it
//! is produced. The stream ends when the source closes, when the deadline
//! passes, or after yielding one error. Whichever happens first (including
//! the consumer dropping the stream early), the parent correlation record
//! receives a [`StreamSummary`] exactly once.

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::decoder::FrameDecoder;
use super::log::{EventPayload, StreamEvent};
use crate::error::StreamError;
use crate::monitor::Monitor;
use crate::telemetry::{CorrelationId, StreamSummary};

/// Default time a stream is followed before it is closed.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(60);

/// A tracked, non-restartable event sequence.
pub type TrackedStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, StreamError>> + Send>>;

type ByteSource = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// Creates tracked streams that report into a shared [`Monitor`].
#[derive(Debug, Clone)]
pub struct EventTracker {
    monitor: Arc<Monitor>,
}

impl EventTracker {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self { monitor }
    }

    /// Track `source`, correlating every event with `parent`.
    pub fn track<S, B, E>(&self, source: S, parent: CorrelationId, timeout: Duration) -> TrackedStream
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let source = source.map(|item| {
            item.map(|chunk| Bytes::copy_from_slice(chunk.as_ref()))
                .map_err(|e| StreamError::Source(e.to_string()))
        });
        self.track_source(Box::pin(source), parent, timeout)
    }

    /// Open `url` with a GET request and track the response body.
    ///
    /// A non-200 response or a failed request produces a stream whose only
    /// item is the error; the parent record is still finalized.
    pub async fn connect(
        &self,
        client: &reqwest::Client,
        url: &str,
        token: Option<&str>,
        parent: CorrelationId,
        timeout: Duration,
    ) -> TrackedStream {
        info!(cid = %parent, url = %url, "Starting event stream");

        let mut request = client.get(url).timeout(timeout);
        if let Some(token) = token {
            request = request.basic_auth(token, Some(""));
        }

        let failure = match request.send().await {
            Ok(response) if response.status().as_u16() == 200 => {
                return self.track(response.bytes_stream(), parent, timeout);
            }
            Ok(response) => StreamError::Connect {
                status: response.status().as_u16(),
            },
            Err(e) => StreamError::Source(e.to_string()),
        };

        warn!(cid = %parent, error = %failure, "Failed to open event stream");
        self.track_source(Box::pin(stream::iter([Err(failure)])), parent, timeout)
    }

    fn track_source(&self, source: ByteSource, parent: CorrelationId, timeout: Duration) -> TrackedStream {
        let now = Instant::now();
        let state = TrackerState {
            source,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            monitor: Arc::clone(&self.monitor),
            parent,
            emitted: 0,
            started: now,
            deadline: now + timeout,
            timeout,
            timed_out: false,
            finished: false,
        };

        Box::pin(stream::unfold(state, |mut state| async move {
            loop {
                match state.pending.pop_front() {
                    Some(Ok(payload)) => {
                        let event = state.emit(payload);
                        return Some((Ok(event), state));
                    }
                    Some(Err(e)) => {
                        warn!(cid = %state.parent, error = %e, "Event stream failed");
                        state.pending.clear();
                        state.finalize();
                        return Some((Err(e), state));
                    }
                    None => {}
                }
                if state.finished {
                    return None;
                }

                match tokio::time::timeout_at(state.deadline, state.source.next()).await {
                    Err(_) => {
                        warn!(
                            cid = %state.parent,
                            timeout_secs = state.timeout.as_secs_f64(),
                            "Event stream timed out"
                        );
                        state.timed_out = true;
                        state.finalize();
                        return None;
                    }
                    Ok(None) => {
                        state.finalize();
                        return None;
                    }
                    Ok(Some(Err(e))) => {
                        warn!(cid = %state.parent, error = %e, "Event stream failed");
                        state.finalize();
                        return Some((Err(e), state));
                    }
                    Ok(Some(Ok(chunk))) => state.pending.extend(state.decoder.push(&chunk)),
                }
            }
        }))
    }
}

struct TrackerState {
    source: ByteSource,
    decoder: FrameDecoder,
    pending: VecDeque<Result<EventPayload, StreamError>>,
    monitor: Arc<Monitor>,
    parent: CorrelationId,
    emitted: u64,
    started: Instant,
    deadline: Instant,
    timeout: Duration,
    timed_out: bool,
    finished: bool,
}

impl TrackerState {
    fn emit(&mut self, payload: EventPayload) -> StreamEvent {
        self.emitted += 1;
        let offset_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let event = self.monitor.events().append(&self.parent, offset_ms, payload);
        debug!(
            cid = %self.parent,
            sequence = event.sequence,
            offset_ms = event.offset_ms,
            "Stream event"
        );
        event
    }

    /// Write the stream summary onto the parent record. Idempotent.
    fn finalize(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let summary = StreamSummary {
            events: self.emitted,
            duration_ms: self.started.elapsed().as_secs_f64() * 1000.0,
            timed_out: self.timed_out,
        };
        info!(
            cid = %self.parent,
            events = summary.events,
            duration_ms = summary.duration_ms,
            timed_out = summary.timed_out,
            "Event stream ended"
        );
        self.monitor.chain().attach_stream(&self.parent, summary);
    }
}

impl Drop for TrackerState {
    fn drop(&mut self) {
        self.finalize();
    }
}
