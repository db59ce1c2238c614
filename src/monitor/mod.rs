// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared monitoring state.
//!
//! A [`Monitor`] owns the correlation chain, the per-operation stats table,
//! the stream event log and the concurrency limiter. It is created once by
//! the embedding program and shared as `Arc<Monitor>`; every instrumented
//! call, orchestrator and tracker writes into the same instance.

pub mod instrument;
pub mod limiter;
pub mod snapshot;

pub use instrument::{AttachMeta, CallContext, CallMeta, Instrumented, Operation, META_KEY};
pub use limiter::{ConcurrencyLimiter, OperationPermit, DEFAULT_MAX_PARALLEL};
pub use snapshot::{CorrelationEntry, CorrelationList, Dashboard, RECENT_EVENTS};

use crate::stream::EventLog;
use crate::telemetry::{CorrelationChain, MetricsSnapshot, StatsTable};

/// Registry of everything observability snapshots read from.
#[derive(Debug, Default)]
pub struct Monitor {
    chain: CorrelationChain,
    stats: StatsTable,
    events: EventLog,
    limiter: ConcurrencyLimiter,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a monitor whose limiter carries per-operation caps.
    pub fn with_limiter(limiter: ConcurrencyLimiter) -> Self {
        Self {
            limiter,
            ..Self::default()
        }
    }

    pub fn chain(&self) -> &CorrelationChain {
        &self.chain
    }

    pub fn stats(&self) -> &StatsTable {
        &self.stats
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Aggregate call counts and latency per operation.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.stats.snapshot()
    }

    /// Every correlation record, slowest first.
    pub fn correlations(&self) -> CorrelationList {
        CorrelationList::from_records(self.chain.records())
    }
}
