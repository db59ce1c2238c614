// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Read-only views for dashboards.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Monitor;
use crate::cache::{CacheSummary, TtlCache};
use crate::stream::EventSummary;
use crate::telemetry::{CallStatus, CorrelationId, CorrelationRecord, MetricsSnapshot};

/// Number of recent events a dashboard shows.
pub const RECENT_EVENTS: usize = 20;

/// One row of the correlation list.
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationEntry {
    pub correlation_id: CorrelationId,
    pub operation: String,
    pub status: CallStatus,
    pub started_at: DateTime<Utc>,
    /// Zero while the call is still running.
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<CorrelationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<CorrelationRecord> for CorrelationEntry {
    fn from(record: CorrelationRecord) -> Self {
        Self {
            correlation_id: record.correlation_id,
            operation: record.operation,
            status: record.status,
            started_at: record.started_at,
            elapsed_ms: record.elapsed_ms.unwrap_or(0.0),
            request_id: record.request_id,
            parent: record.parent,
            error: record.error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationList {
    pub total: usize,
    pub correlations: Vec<CorrelationEntry>,
}

impl CorrelationList {
    /// Build the list sorted by elapsed time, descending.
    pub fn from_records(records: Vec<CorrelationRecord>) -> Self {
        let mut correlations: Vec<CorrelationEntry> =
            records.into_iter().map(CorrelationEntry::from).collect();
        correlations.sort_by(|a, b| b.elapsed_ms.total_cmp(&a.elapsed_ms));
        Self {
            total: correlations.len(),
            correlations,
        }
    }
}

/// Everything a dashboard renders, in one serializable value.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub metrics: MetricsSnapshot,
    pub correlations: CorrelationList,
    pub cache: CacheSummary,
    pub events: EventSummary,
}

impl Dashboard {
    pub fn collect<V: Clone>(monitor: &Monitor, cache: &TtlCache<V>, recent_events: usize) -> Self {
        Self {
            metrics: monitor.metrics_snapshot(),
            correlations: monitor.correlations(),
            cache: cache.summary(),
            events: monitor.events().summary(recent_events),
        }
    }
}
