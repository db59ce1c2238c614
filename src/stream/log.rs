// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Append-only log of stream events, grouped by parent correlation id.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::telemetry::CorrelationId;

/// Decoded payload of one event frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Json(serde_json::Value),
    Raw { raw: String },
}

impl EventPayload {
    /// Parse `data` as JSON, keeping it as raw text if it does not decode.
    pub fn parse(data: &str) -> Self {
        match serde_json::from_str(data) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Raw {
                raw: data.to_string(),
            },
        }
    }

    /// The `status` field of a JSON object payload, if present.
    pub fn status(&self) -> Option<&str> {
        match self {
            Self::Json(value) => value.get("status").and_then(|s| s.as_str()),
            Self::Raw { .. } => None,
        }
    }
}

/// One recognised event. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct StreamEvent {
    pub parent: CorrelationId,
    /// 1-based, strictly increasing within `parent`'s stream.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub offset_ms: f64,
    pub payload: EventPayload,
}

/// Event totals and the most recent events.
#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub total_events: usize,
    pub streams: usize,
    pub events_by_stream: BTreeMap<String, usize>,
    pub recent: Vec<StreamEvent>,
}

/// Shared append-only event log.
#[derive(Debug, Default)]
pub struct EventLog {
    streams: DashMap<CorrelationId, Vec<(u64, StreamEvent)>>,
    next_ordinal: AtomicU64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event under `parent`, assigning it the stream's next sequence.
    ///
    /// Sequence numbers are handed out under the per-stream entry lock, so
    /// tracked events and markers sharing a parent never collide.
    pub fn append(&self, parent: &CorrelationId, offset_ms: f64, payload: EventPayload) -> StreamEvent {
        let ordinal = self.next_ordinal.fetch_add(1, Ordering::Relaxed);
        let mut events = self.streams.entry(parent.clone()).or_default();
        let event = StreamEvent {
            parent: parent.clone(),
            sequence: events.last().map_or(0, |(_, e)| e.sequence) + 1,
            timestamp: Utc::now(),
            offset_ms,
            payload,
        };
        events.push((ordinal, event.clone()));
        event
    }

    /// Append a milestone event that did not arrive over a stream.
    pub fn append_marker(&self, parent: &CorrelationId, payload: serde_json::Value) -> StreamEvent {
        self.append(parent, 0.0, EventPayload::Json(payload))
    }

    /// Events for one stream, in sequence order.
    pub fn events_for(&self, parent: &CorrelationId) -> Vec<StreamEvent> {
        self.streams
            .get(parent)
            .map(|events| events.iter().map(|(_, e)| e.clone()).collect())
            .unwrap_or_default()
    }

    /// The last `n` events across all streams, oldest first.
    pub fn recent(&self, n: usize) -> Vec<StreamEvent> {
        let mut all: Vec<(u64, StreamEvent)> = self
            .streams
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|(ordinal, _)| *ordinal);
        let skip = all.len().saturating_sub(n);
        all.into_iter().skip(skip).map(|(_, e)| e).collect()
    }

    pub fn len(&self) -> usize {
        self.streams.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self, recent_n: usize) -> EventSummary {
        let events_by_stream: BTreeMap<String, usize> = self
            .streams
            .iter()
            .map(|e| (e.key().to_string(), e.value().len()))
            .collect();

        EventSummary {
            total_events: events_by_stream.values().sum(),
            streams: events_by_stream.len(),
            events_by_stream,
            recent: self.recent(recent_n),
        }
    }
}
