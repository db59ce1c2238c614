// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Remote code-analysis tasks.
//!
//! - [`AnalysisBackend`] - contract with the real engine
//! - [`SonarBackend`] - SonarQube / SonarCloud implementation
//! - [`AnalysisOrchestrator`] - submit, poll, patch and watch tasks, with a
//!   simulated fallback when no engine is reachable
//!
//! # Example
//!
//! ```rust,ignore
//! use scanflow::analysis::{AnalysisOrchestrator, PollBudget};
//!
//! let orchestrator = AnalysisOrchestrator::new(monitor, cache);
//! let submission = orchestrator.submit("demo", files).await?;
//! let snapshot = orchestrator
//!     .wait_for_completion(&submission.task_id, PollBudget::default())
//!     .await?;
//! ```

mod backend;
mod orchestrator;
mod simulate;
mod sonar;
mod types;

#[cfg(test)]
pub use backend::MockAnalysisBackend;
pub use backend::AnalysisBackend;
pub use orchestrator::{
    follow_until_terminal, AnalysisOrchestrator, PollBudget, ISSUE_PAGE_PAUSE, ISSUE_PAGE_SIZE,
};
pub use simulate::{synthetic_issues, SimulationConfig};
pub use sonar::{parse_task_id, SonarBackend, DEFAULT_BASE_URL, DEFAULT_SCANNER};
pub use types::{
    cache_key, Issue, IssuePage, PatchOutcome, Submission, SubmitMode, TaskMode, TaskRecord,
    TaskSnapshot, TaskStatus, WatchOutcome,
};
