// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Telemetry, correlation, and metrics infrastructure.
//!
//! - **Logging**: `tracing` with a stderr formatter that redacts secrets
//! - **Correlation**: short ids and the parent-linked record chain
//! - **Metrics**: per-operation counts and latency
//!
//! # Usage
//!
//! ```rust,ignore
//! use scanflow::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::default())?;
//! ```
//!
//! Log fields should carry ids, names, counts and durations. Anything that
//! could hold a credential is still masked by [`redact_secrets`] on the way
//! out, but should not be logged on purpose.

mod correlation;
mod init;
pub mod metrics;
pub mod redact;

pub use correlation::{
    CallStatus, CorrelationChain, CorrelationId, CorrelationRecord, StreamSummary,
};
pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{Histogram, MetricsSnapshot, StatsTable, ToolStats, ToolStatsView};
pub use redact::{redact_secrets, RedactingMakeWriter, RedactingWriter};
