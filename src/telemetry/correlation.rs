// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Correlation IDs and the correlation chain.
//!
//! Every instrumented invocation gets a [`CorrelationId`] and a
//! [`CorrelationRecord`]. Records link to a parent id, forming a tree that the
//! chain does not check for cycles.

use std::fmt;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of generated correlation tokens.
const SHORT_ID_LEN: usize = 8;

/// A short opaque token identifying one instrumented invocation.
///
/// Generated ids are the first eight hex characters of a v4 UUID. Ids can also
/// be built from arbitrary labels so callers can name a parent step that was
/// not itself instrumented.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a new random correlation ID.
    pub fn new() -> Self {
        let mut token = Uuid::new_v4().simple().to_string();
        token.truncate(SHORT_ID_LEN);
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({})", self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(label: &str) -> Self {
        Self(label.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(label: String) -> Self {
        Self(label)
    }
}

/// Lifecycle state of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Running,
    Success,
    Error,
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Event stream totals attached to a record when a tracked stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamSummary {
    pub events: u64,
    pub duration_ms: f64,
    pub timed_out: bool,
}

/// One instrumented invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub correlation_id: CorrelationId,
    pub operation: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<f64>,
    pub status: CallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<CorrelationId>,
    /// Truncated debug rendering of the call arguments.
    pub args: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamSummary>,
}

impl CorrelationRecord {
    /// Create a running record.
    pub fn start(
        correlation_id: CorrelationId,
        operation: impl Into<String>,
        request_id: Option<String>,
        parent: Option<CorrelationId>,
        args: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id,
            operation: operation.into(),
            started_at: Utc::now(),
            ended_at: None,
            elapsed_ms: None,
            status: CallStatus::Running,
            request_id,
            parent,
            args: args.into(),
            error: None,
            stream: None,
        }
    }

    /// Mark the record successful. Returns false if it was already terminal.
    pub fn finish_success(&mut self, elapsed_ms: f64) -> bool {
        self.finish(CallStatus::Success, elapsed_ms, None)
    }

    /// Mark the record failed. Returns false if it was already terminal.
    pub fn finish_error(&mut self, elapsed_ms: f64, error: impl Into<String>) -> bool {
        self.finish(CallStatus::Error, elapsed_ms, Some(error.into()))
    }

    fn finish(&mut self, status: CallStatus, elapsed_ms: f64, error: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.elapsed_ms = Some(elapsed_ms);
        self.ended_at = Some(Utc::now());
        self.error = error;
        true
    }
}

/// Map from correlation id to its record, shared by every component.
#[derive(Debug, Default)]
pub struct CorrelationChain {
    records: DashMap<CorrelationId, CorrelationRecord>,
}

impl CorrelationChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: CorrelationRecord) {
        self.records.insert(record.correlation_id.clone(), record);
    }

    pub fn get(&self, id: &CorrelationId) -> Option<CorrelationRecord> {
        self.records.get(id).map(|r| r.value().clone())
    }

    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.records.contains_key(id)
    }

    /// Finish a record successfully. Unknown ids and repeat finishes return false.
    pub fn finish_success(&self, id: &CorrelationId, elapsed_ms: f64) -> bool {
        self.records
            .get_mut(id)
            .map(|mut r| r.finish_success(elapsed_ms))
            .unwrap_or(false)
    }

    /// Finish a record as failed. Unknown ids and repeat finishes return false.
    pub fn finish_error(&self, id: &CorrelationId, elapsed_ms: f64, error: &str) -> bool {
        self.records
            .get_mut(id)
            .map(|mut r| r.finish_error(elapsed_ms, error))
            .unwrap_or(false)
    }

    /// Attach stream totals to a record, if it exists.
    pub fn attach_stream(&self, id: &CorrelationId, summary: StreamSummary) -> bool {
        match self.records.get_mut(id) {
            Some(mut record) => {
                record.stream = Some(summary);
                true
            }
            None => false,
        }
    }

    /// Records whose external request id matches.
    pub fn by_request_id(&self, request_id: &str) -> Vec<CorrelationRecord> {
        self.records
            .iter()
            .filter(|r| r.request_id.as_deref() == Some(request_id))
            .map(|r| r.value().clone())
            .collect()
    }

    /// Direct children of `parent`.
    pub fn children(&self, parent: &CorrelationId) -> Vec<CorrelationRecord> {
        let mut children: Vec<_> = self
            .records
            .iter()
            .filter(|r| r.parent.as_ref() == Some(parent))
            .map(|r| r.value().clone())
            .collect();
        children.sort_by_key(|r| r.started_at);
        children
    }

    /// All records, oldest first.
    pub fn records(&self) -> Vec<CorrelationRecord> {
        let mut all: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by_key(|r| r.started_at);
        all
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
