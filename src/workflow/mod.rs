// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end workflow: design → component files → analysis → patches →
//! quality gate → review.
//!
//! The design tool and source control are reached through
//! [`DesignSource`] and [`SourceControl`]; [`Workflow`] drives the analysis
//! tools in between.

mod design;
mod pipeline;
mod review;

pub use design::{
    component_test, parse_design_url, DesignArtifact, DesignRef, DesignSource, StaticDesignSource,
    COMPONENT_DIR,
};
pub use pipeline::{
    OverallStatus, StepResult, StepStatus, Workflow, WorkflowOptions, WorkflowReport, MAX_PATCHES,
    PATCH_SETTLE,
};
pub use review::{GitHubClient, ReviewRef, ReviewRequest, SourceControl, GITHUB_API_URL};
