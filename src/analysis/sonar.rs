// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SonarQube / SonarCloud backend.
//!
//! Scans run through the `sonar-scanner` CLI; everything else is a single
//! request against the web API, authenticated with the token as the
//! basic-auth user and an empty password.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::backend::AnalysisBackend;
use super::types::{IssuePage, TaskStatus};
use crate::error::AnalysisError;

/// Default server URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:9000";

/// Default scanner executable.
pub const DEFAULT_SCANNER: &str = "sonar-scanner";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

static TASK_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"task\?id=([A-Za-z0-9_-]+)").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct CeTaskResponse {
    #[serde(default)]
    task: CeTask,
}

#[derive(Debug, Default, Deserialize)]
struct CeTask {
    status: Option<String>,
}

/// Backend talking to a Sonar server.
#[derive(Debug, Clone)]
pub struct SonarBackend {
    client: Client,
    base_url: String,
    token: String,
    organization: Option<String>,
    scanner: String,
}

impl SonarBackend {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AnalysisError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            organization: None,
            scanner: DEFAULT_SCANNER.to_string(),
        })
    }

    /// Set the organization (required by SonarCloud).
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        let organization = organization.into();
        self.organization = (!organization.is_empty()).then_some(organization);
        self
    }

    /// Use a different scanner executable.
    pub fn with_scanner(mut self, scanner: impl Into<String>) -> Self {
        self.scanner = scanner.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .basic_auth(&self.token, Some(""))
    }

    fn scanner_args(&self, project_key: &str) -> Vec<String> {
        let mut args = vec![
            format!("-Dsonar.projectKey={project_key}"),
            "-Dsonar.sources=.".to_string(),
            format!("-Dsonar.host.url={}", self.base_url),
            format!("-Dsonar.token={}", self.token),
        ];
        if let Some(org) = &self.organization {
            args.push(format!("-Dsonar.organization={org}"));
        }
        args
    }
}

/// Find the compute-engine task id in scanner output.
pub fn parse_task_id(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| line.contains("ceTaskId") || line.contains("task?id="))
        .find_map(|line| TASK_ID_PATTERN.captures(line))
        .map(|caps| caps[1].to_string())
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, AnalysisError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AnalysisError::remote(status.as_u16(), body))
}

#[async_trait]
impl AnalysisBackend for SonarBackend {
    async fn run_scanner(&self, project_key: &str, workdir: &Path) -> Result<Option<String>, AnalysisError> {
        info!(project = %project_key, scanner = %self.scanner, "Running scanner");

        let output = Command::new(&self.scanner)
            .args(self.scanner_args(project_key))
            .current_dir(workdir)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnalysisError::BackendUnavailable(format!(
                "scanner exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let task_id = parse_task_id(&stdout);
        if task_id.is_none() {
            warn!(project = %project_key, "Could not extract task id from scanner output");
        }
        Ok(task_id)
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, AnalysisError> {
        let response = self.get("/api/ce/task").query(&[("id", task_id)]).send().await?;
        let body: CeTaskResponse = error_for_status(response).await?.json().await?;
        let status = TaskStatus::from(body.task.status.as_deref().unwrap_or("UNKNOWN"));
        debug!(task_id = %task_id, status = %status, "Task status");
        Ok(status)
    }

    async fn issues_page(&self, project_key: &str, page: u32, page_size: u32) -> Result<IssuePage, AnalysisError> {
        let response = self
            .get("/api/issues/search")
            .query(&[
                ("componentKeys", project_key.to_string()),
                ("ps", page_size.to_string()),
                ("p", page.to_string()),
                ("resolved", "false".to_string()),
            ])
            .send()
            .await?;
        Ok(error_for_status(response).await?.json().await?)
    }

    async fn quality_gate(&self, project_key: &str) -> Result<Value, AnalysisError> {
        let response = self
            .get("/api/qualitygates/project_status")
            .query(&[("projectKey", project_key)])
            .send()
            .await?;
        let body: Value = error_for_status(response).await?.json().await?;
        Ok(json!({ "qualityGate": body }))
    }

    fn task_events_url(&self, task_id: &str) -> String {
        format!("{}/api/ce/task?id={}&stream=true", self.base_url, task_id)
    }

    fn stream_token(&self) -> Option<String> {
        Some(self.token.clone())
    }
}
