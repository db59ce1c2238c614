// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Source-control collaborator.
//!
//! [`GitHubClient`] opens a pull request without a local checkout, through
//! the Git data API:
//!
//! 1. default branch of the repository
//! 2. head sha of the default branch
//! 3. new branch ref at that sha
//! 4. tree with the files, based on that sha
//! 5. commit of the tree
//! 6. branch ref moved to the commit
//! 7. pull request from the branch into the default branch

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::WorkflowError;
use crate::monitor::AttachMeta;

/// Default API root.
pub const GITHUB_API_URL: &str = "https://api.github.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("scanflow/", env!("CARGO_PKG_VERSION"));

/// What to put up for review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRequest {
    /// `owner/name`.
    pub repo: String,
    pub branch: String,
    /// Repository path to contents.
    pub files: BTreeMap<String, String>,
    pub title: String,
    pub body: String,
}

/// An opened review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRef {
    pub url: String,
    pub number: u64,
}

impl AttachMeta for ReviewRef {}

/// Something that can open a review for a set of files.
#[async_trait]
pub trait SourceControl: Send + Sync {
    async fn open_review(&self, request: &ReviewRequest) -> Result<ReviewRef, WorkflowError>;
}

#[derive(Debug, Deserialize)]
struct Repository {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    html_url: String,
    number: u64,
}

/// GitHub REST client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    token: String,
    api_url: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>) -> Result<Self, WorkflowError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| WorkflowError::SourceControl {
                message: format!("Failed to build HTTP client: {e}"),
                status_code: None,
            })?;

        Ok(Self {
            client,
            token: token.into(),
            api_url: GITHUB_API_URL.to_string(),
        })
    }

    /// Point at a different API root (GitHub Enterprise, tests).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: Method, repo: &str, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/repos/{repo}{path}", self.api_url))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        step: &str,
        builder: RequestBuilder,
        expected: Option<StatusCode>,
    ) -> Result<T, WorkflowError> {
        let response = builder.send().await.map_err(|e| WorkflowError::SourceControl {
            message: format!("{step}: {e}"),
            status_code: e.status().map(|s| s.as_u16()),
        })?;

        let status = response.status();
        let ok = match expected {
            Some(expected) => status == expected,
            None => status.is_success(),
        };
        if !ok {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkflowError::source_control(
                format!("{step} failed: {body}"),
                status.as_u16(),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| WorkflowError::SourceControl {
                message: format!("{step}: invalid response: {e}"),
                status_code: Some(status.as_u16()),
            })
    }
}

#[async_trait]
impl SourceControl for GitHubClient {
    async fn open_review(&self, request: &ReviewRequest) -> Result<ReviewRef, WorkflowError> {
        let repo = request.repo.as_str();

        let repository: Repository = self
            .send("get repository", self.request(Method::GET, repo, ""), None)
            .await?;
        let base = repository.default_branch;

        let head: GitRef = self
            .send(
                "get base ref",
                self.request(Method::GET, repo, &format!("/git/ref/heads/{base}")),
                None,
            )
            .await?;
        let base_sha = head.object.sha;
        debug!(repo, base = %base, sha = %base_sha, "Resolved base branch");

        let _: Value = self
            .send(
                "create branch",
                self.request(Method::POST, repo, "/git/refs").json(&json!({
                    "ref": format!("refs/heads/{}", request.branch),
                    "sha": base_sha,
                })),
                Some(StatusCode::CREATED),
            )
            .await?;

        let tree_entries: Vec<Value> = request
            .files
            .iter()
            .map(|(path, content)| {
                json!({"path": path, "mode": "100644", "type": "blob", "content": content})
            })
            .collect();
        let tree: Created = self
            .send(
                "create tree",
                self.request(Method::POST, repo, "/git/trees")
                    .json(&json!({"base_tree": base_sha, "tree": tree_entries})),
                None,
            )
            .await?;

        let commit: Created = self
            .send(
                "create commit",
                self.request(Method::POST, repo, "/git/commits").json(&json!({
                    "message": request.title,
                    "tree": tree.sha,
                    "parents": [base_sha],
                })),
                None,
            )
            .await?;

        let _: Value = self
            .send(
                "update branch",
                self.request(
                    Method::PATCH,
                    repo,
                    &format!("/git/refs/heads/{}", request.branch),
                )
                .json(&json!({"sha": commit.sha, "force": true})),
                None,
            )
            .await?;

        let pull: PullRequest = self
            .send(
                "create pull request",
                self.request(Method::POST, repo, "/pulls").json(&json!({
                    "title": request.title,
                    "head": request.branch,
                    "base": base,
                    "body": request.body,
                })),
                None,
            )
            .await?;

        info!(repo, number = pull.number, url = %pull.html_url, "Opened pull request");
        Ok(ReviewRef {
            url: pull.html_url,
            number: pull.number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_is_trimmed() {
        let client = GitHubClient::new("t").unwrap().with_api_url("http://localhost:1/");
        assert_eq!(client.api_url, "http://localhost:1");
    }

    #[tokio::test]
    async fn test_unreachable_api_is_a_source_control_error() {
        let client = GitHubClient::new("t").unwrap().with_api_url("http://127.0.0.1:1");
        let request = ReviewRequest {
            repo: "owner/repo".to_string(),
            branch: "figma-1-2-0".to_string(),
            files: BTreeMap::new(),
            title: "t".to_string(),
            body: String::new(),
        };
        let err = client.open_review(&request).await.unwrap_err();
        match err {
            WorkflowError::SourceControl { message, .. } => {
                assert!(message.starts_with("get repository"));
            }
            other => panic!("Expected SourceControl, got {other:?}"),
        }
    }
}
