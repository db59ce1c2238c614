// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for scanflow.
//!
//! This module provides strongly-typed errors for different parts of the application,
//! using `thiserror` for ergonomic error definitions and `anyhow` for error propagation.

use thiserror::Error;

/// Errors that can occur while orchestrating an analysis task.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The task id is unknown, or its record expired from the cache.
    #[error("Task not found: {0}")]
    NotFound(String),

    /// The real analysis backend is absent or unreachable.
    #[error("Analysis backend unavailable: {0}")]
    BackendUnavailable(String),

    /// An operation that has no simulated fallback was called without a backend.
    #[error("Operation requires a configured backend: {0}")]
    BackendRequired(String),

    #[error("Remote error: HTTP {status} - {body}")]
    Remote { status: u16, body: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Response parsing error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
}

impl AnalysisError {
    /// Create a remote error from an HTTP status and response body.
    pub fn remote(status: u16, body: impl Into<String>) -> Self {
        Self::Remote {
            status,
            body: body.into(),
        }
    }

    /// Check if this is a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if the simulated fallback should absorb this error.
    pub fn is_recoverable_by_simulation(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable(_) | Self::NetworkError(_) | Self::IoError(_) | Self::Timeout(_)
        )
    }
}

impl From<std::io::Error> for AnalysisError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::BackendUnavailable(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::ParseError(err.to_string())
        } else {
            Self::NetworkError(err.to_string())
        }
    }
}

/// Errors that abort an event stream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    #[error("Failed to connect: HTTP {status}")]
    Connect { status: u16 },

    #[error("Stream source error: {0}")]
    Source(String),

    #[error("Failed to decode event frame: {0}")]
    Decode(String),

    #[error("Stream timed out after {0}ms")]
    Timeout(u64),
}

/// Errors that can occur during tool execution.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors raised by the end-to-end workflow and its collaborators.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Invalid design URL: {0}")]
    InvalidDesignUrl(String),

    #[error("Design source error: {0}")]
    Design(String),

    #[error("Source control error: {message}")]
    SourceControl {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),
}

impl WorkflowError {
    /// Create a source-control error with an HTTP status.
    pub fn source_control(message: impl Into<String>, status_code: u16) -> Self {
        Self::SourceControl {
            message: message.into(),
            status_code: Some(status_code),
        }
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
