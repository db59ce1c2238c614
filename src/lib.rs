// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! scanflow - instrumented remote code analysis.
//!
//! Wraps long-running analysis tasks with latency measurement, causal
//! correlation across nested calls, per-operation concurrency limits, a
//! short-lived task cache and live progress over server-sent events. When
//! no analysis server is reachable, tasks are simulated locally.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`error`] - Error types and result aliases
//! - [`config`] - Configuration loading and merging
//! - [`telemetry`] - Logging, correlation records and per-operation stats
//! - [`cache`] - TTL cache for task records
//! - [`monitor`] - Shared registry, instrumentation wrapper, limiter and snapshots
//! - [`stream`] - SSE decoding and tracked event streams
//! - [`analysis`] - Task orchestration against a real or simulated engine
//! - [`tools`] - Named JSON tools over the analysis operations
//! - [`workflow`] - Design to pull request pipeline
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scanflow::{AnalysisOrchestrator, Monitor, PollBudget, TtlCache};
//!
//! let orchestrator = AnalysisOrchestrator::new(Arc::new(Monitor::new()), Arc::new(TtlCache::new()));
//! let submission = orchestrator.submit("demo", files).await?;
//! let snapshot = orchestrator
//!     .wait_for_completion(&submission.task_id, PollBudget::default())
//!     .await?;
//! ```

pub mod analysis;
pub mod cache;
pub mod config;
pub mod error;
pub mod monitor;
pub mod stream;
pub mod telemetry;
pub mod tools;
pub mod workflow;

// Re-export commonly used types at crate root
pub use analysis::{AnalysisBackend, AnalysisOrchestrator, PollBudget, SonarBackend, TaskStatus};
pub use cache::TtlCache;
pub use error::{AnalysisError, ConfigError, Result, StreamError, ToolError, WorkflowError};
pub use monitor::{CallContext, Monitor, Operation};
pub use telemetry::CorrelationId;
pub use tools::ToolRegistry;
pub use workflow::{Workflow, WorkflowReport};

/// scanflow version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
