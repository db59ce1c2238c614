// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-operation latency statistics.
//!
//! Every completion, successful or not, advances an operation's count and
//! cumulative latency together. Entries are locked per operation name so
//! unrelated operations never contend.

use std::collections::BTreeMap;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

/// Aggregate statistics for one operation name.
#[derive(Debug, Clone)]
pub struct ToolStats {
    /// Total number of completions.
    pub count: u64,

    /// Completions that returned an error.
    pub failures: u64,

    /// Cumulative elapsed milliseconds.
    pub total_ms: f64,

    /// Latency distribution.
    pub histogram: Histogram,
}

impl ToolStats {
    pub fn new() -> Self {
        Self {
            count: 0,
            failures: 0,
            total_ms: 0.0,
            histogram: Histogram::default(),
        }
    }

    /// Record one completion.
    pub fn record(&mut self, elapsed: Duration, success: bool) {
        self.count += 1;
        if !success {
            self.failures += 1;
        }
        self.total_ms += elapsed.as_secs_f64() * 1000.0;
        self.histogram.record(elapsed);
    }

    /// Average latency in milliseconds.
    pub fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms / self.count as f64
        }
    }
}

impl Default for ToolStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Simple histogram with fixed buckets for latency tracking.
#[derive(Debug, Clone)]
pub struct Histogram {
    /// Upper bounds in microseconds; the last count slot is overflow.
    buckets: Vec<u64>,
    counts: Vec<u64>,
}

impl Histogram {
    /// Create a histogram with custom bucket boundaries (in microseconds).
    pub fn with_buckets(buckets: Vec<u64>) -> Self {
        let counts = vec![0; buckets.len() + 1];
        Self { buckets, counts }
    }

    pub fn record(&mut self, duration: Duration) {
        let micros = duration.as_micros() as u64;
        let idx = self
            .buckets
            .iter()
            .position(|&b| micros <= b)
            .unwrap_or(self.buckets.len());
        self.counts[idx] += 1;
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Approximate percentile as the upper bound of the bucket holding it.
    pub fn percentile(&self, p: f64) -> Duration {
        let total: u64 = self.counts.iter().sum();
        if total == 0 {
            return Duration::ZERO;
        }

        let target = (total as f64 * p / 100.0).ceil() as u64;
        let mut cumulative = 0u64;
        for (i, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                let micros = match self.buckets.get(i) {
                    Some(&bound) => bound,
                    None => self.buckets.last().copied().unwrap_or(0) * 10,
                };
                return Duration::from_micros(micros);
            }
        }
        Duration::ZERO
    }

    pub fn p50(&self) -> Duration {
        self.percentile(50.0)
    }

    pub fn p99(&self) -> Duration {
        self.percentile(99.0)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        // 1ms, 10ms, 100ms, 1s, 10s, 60s
        Self::with_buckets(vec![1_000, 10_000, 100_000, 1_000_000, 10_000_000, 60_000_000])
    }
}

/// Per-operation view used by snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct ToolStatsView {
    pub count: u64,
    pub failures: u64,
    pub total_ms: f64,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p99_ms: f64,
}

impl From<&ToolStats> for ToolStatsView {
    fn from(stats: &ToolStats) -> Self {
        Self {
            count: stats.count,
            failures: stats.failures,
            total_ms: stats.total_ms,
            avg_ms: stats.avg_ms(),
            p50_ms: stats.histogram.p50().as_secs_f64() * 1000.0,
            p99_ms: stats.histogram.p99().as_secs_f64() * 1000.0,
        }
    }
}

/// Aggregate metrics across every operation.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub avg_latency_ms: f64,
    pub tools: BTreeMap<String, ToolStatsView>,
}

impl MetricsSnapshot {
    /// Format as a human-readable report.
    pub fn format_report(&self) -> String {
        let mut report = String::new();
        for (name, stats) in &self.tools {
            report.push_str(&format!(
                "{}: {} calls, {:.1}ms total, {:.1}ms avg\n",
                name, stats.count, stats.total_ms, stats.avg_ms
            ));
        }
        report
    }
}

/// Table of [`ToolStats`] keyed by operation name.
#[derive(Debug, Default)]
pub struct StatsTable {
    tools: DashMap<String, ToolStats>,
}

impl StatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completion; count and sum advance under the same entry lock.
    pub fn record(&self, name: &str, elapsed: Duration, success: bool) {
        self.tools
            .entry(name.to_string())
            .or_insert_with(ToolStats::new)
            .record(elapsed, success);
    }

    pub fn get(&self, name: &str) -> Option<ToolStats> {
        self.tools.get(name).map(|s| s.value().clone())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let tools: BTreeMap<String, ToolStatsView> = self
            .tools
            .iter()
            .map(|entry| (entry.key().clone(), ToolStatsView::from(entry.value())))
            .collect();

        let total_calls: u64 = tools.values().map(|t| t.count).sum();
        let total_ms: f64 = tools.values().map(|t| t.total_ms).sum();
        let avg_latency_ms = if total_calls == 0 {
            0.0
        } else {
            total_ms / total_calls as f64
        };

        MetricsSnapshot {
            total_calls,
            avg_latency_ms,
            tools,
        }
    }
}
