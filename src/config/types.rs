// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! Defines the structure of workspace and resolved configuration,
//! supporting JSON and YAML formats.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::{PollBudget, SimulationConfig, DEFAULT_BASE_URL, DEFAULT_SCANNER};
use crate::cache::DEFAULT_TTL;
use crate::monitor::{ConcurrencyLimiter, DEFAULT_MAX_PARALLEL};
use crate::stream::DEFAULT_STREAM_TIMEOUT;

/// Default review repository (`owner/name`).
pub const DEFAULT_REPO: &str = "Tetsukiba/MCP-demo-CSCI-435";

/// Default analysis project key.
pub const DEFAULT_PROJECT: &str = "MCP-demo-CSCI-435";

/// Operations the default concurrency cap applies to.
pub const KNOWN_OPERATIONS: &[&str] = &[
    "sonar.scan",
    "sonar.status",
    "sonar.apply_patch",
    "sonar.quality_gate",
    "design.fetch",
    "source_control.open_review",
];

/// Workspace configuration for scanflow.
/// Can be defined in .scanflow.json or .scanflow/config.json in the project root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Seconds a task record stays readable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_secs: Option<u64>,

    /// Concurrency cap for every known operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,

    /// Per-operation concurrency caps, by operation name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_limits: Option<HashMap<String, usize>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollConfig>,

    /// Seconds an event stream may run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationDelays>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sonar: Option<SonarConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<GitHubConfig>,
}

/// Polling budget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_ms: Option<u64>,
    /// Hard limit on a whole wait
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

/// Stage delays of the simulated engine, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationDelays {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzing_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computing_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finishing_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reanalysis_ms: Option<u64>,
}

impl SimulationDelays {
    /// Fill unset stages from `base`.
    pub fn apply_to(&self, base: SimulationConfig) -> SimulationConfig {
        let ms = |value: Option<u64>, default: Duration| value.map(Duration::from_millis).unwrap_or(default);
        SimulationConfig {
            queued: ms(self.queued_ms, base.queued),
            analyzing: ms(self.analyzing_ms, base.analyzing),
            computing: ms(self.computing_ms, base.computing),
            finishing: ms(self.finishing_ms, base.finishing),
            reanalysis: ms(self.reanalysis_ms, base.reanalysis),
        }
    }

    /// Later values win.
    pub fn merge(&mut self, other: &SimulationDelays) {
        self.queued_ms = other.queued_ms.or(self.queued_ms);
        self.analyzing_ms = other.analyzing_ms.or(self.analyzing_ms);
        self.computing_ms = other.computing_ms.or(self.computing_ms);
        self.finishing_ms = other.finishing_ms.or(self.finishing_ms);
        self.reanalysis_ms = other.reanalysis_ms.or(self.reanalysis_ms);
    }
}

/// Analysis server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SonarConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_key: Option<String>,
    /// Scanner executable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scanner: Option<String>,
}

/// Review repository settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// `owner/name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

/// Resolved configuration with all values set.
/// This is the merged result of global, workspace, environment, and CLI configs.
///
/// Tokens are never serialized.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub cache_ttl_secs: u64,
    pub max_parallel: usize,
    pub operation_limits: HashMap<String, usize>,
    pub poll_max_attempts: u32,
    pub poll_backoff_ms: u64,
    pub poll_deadline_ms: Option<u64>,
    pub stream_timeout_secs: u64,
    pub simulation: SimulationDelays,
    /// Multiplier applied to every simulation delay
    pub simulation_scale: f64,
    /// No base URL means no real backend: every task is simulated.
    pub sonar_base_url: Option<String>,
    #[serde(skip_serializing)]
    pub sonar_token: Option<String>,
    pub sonar_organization: Option<String>,
    pub sonar_project: String,
    pub sonar_scanner: String,
    #[serde(skip_serializing)]
    pub github_token: Option<String>,
    pub github_repo: String,
    pub github_api_url: Option<String>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_TTL.as_secs(),
            max_parallel: DEFAULT_MAX_PARALLEL,
            operation_limits: HashMap::new(),
            poll_max_attempts: 10,
            poll_backoff_ms: 1000,
            poll_deadline_ms: None,
            stream_timeout_secs: DEFAULT_STREAM_TIMEOUT.as_secs(),
            simulation: SimulationDelays::default(),
            simulation_scale: 1.0,
            sonar_base_url: None,
            sonar_token: None,
            sonar_organization: None,
            sonar_project: DEFAULT_PROJECT.to_string(),
            sonar_scanner: DEFAULT_SCANNER.to_string(),
            github_token: None,
            github_repo: DEFAULT_REPO.to_string(),
            github_api_url: None,
        }
    }
}

impl ResolvedConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    pub fn poll_budget(&self) -> PollBudget {
        let budget = PollBudget::new(self.poll_max_attempts, Duration::from_millis(self.poll_backoff_ms));
        match self.poll_deadline_ms {
            Some(ms) => budget.with_deadline(Duration::from_millis(ms)),
            None => budget,
        }
    }

    pub fn simulation_config(&self) -> SimulationConfig {
        let config = self.simulation.apply_to(SimulationConfig::default());
        if (self.simulation_scale - 1.0).abs() > f64::EPSILON {
            config.scaled(self.simulation_scale)
        } else {
            config
        }
    }

    /// Limiter with the default cap on every known operation and the
    /// per-operation caps on top.
    pub fn limiter(&self) -> ConcurrencyLimiter {
        let mut caps: HashMap<String, usize> = KNOWN_OPERATIONS
            .iter()
            .map(|name| (name.to_string(), self.max_parallel))
            .collect();
        caps.extend(self.operation_limits.clone());
        ConcurrencyLimiter::with_overrides(caps)
    }

    /// Server URL to use when a real backend is configured.
    pub fn sonar_url(&self) -> &str {
        self.sonar_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_config_default() {
        let config = WorkspaceConfig::default();
        assert!(config.cache_ttl_secs.is_none());
        assert!(config.sonar.is_none());
    }

    #[test]
    fn test_workspace_config_json_serialization() {
        let config = WorkspaceConfig {
            cache_ttl_secs: Some(120),
            operation_limits: Some(HashMap::from([("sonar.scan".to_string(), 1)])),
            ..Default::default()
        };

        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"cacheTtlSecs\": 120"));
        assert!(json.contains("\"operationLimits\""));

        let parsed: WorkspaceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.cache_ttl_secs, Some(120));
    }

    #[test]
    fn test_workspace_config_yaml_serialization() {
        let yaml = "sonar:\n  baseUrl: https://sonarcloud.io\n  organization: acme\npoll:\n  maxAttempts: 3\n";
        let parsed: WorkspaceConfig = serde_yaml::from_str(yaml).unwrap();
        let sonar = parsed.sonar.unwrap();
        assert_eq!(sonar.base_url.as_deref(), Some("https://sonarcloud.io"));
        assert_eq!(sonar.organization.as_deref(), Some("acme"));
        assert_eq!(parsed.poll.unwrap().max_attempts, Some(3));
    }

    #[test]
    fn test_resolved_config_default() {
        let config = ResolvedConfig::default();
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.max_parallel, 4);
        assert_eq!(config.poll_budget(), PollBudget::default());
        assert_eq!(config.stream_timeout(), Duration::from_secs(60));
        assert_eq!(config.simulation_config(), SimulationConfig::default());
        assert_eq!(config.sonar_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_tokens_are_not_serialized() {
        let config = ResolvedConfig {
            sonar_token: Some("squ_secret".to_string()),
            github_token: Some("ghp_secret".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"githubRepo\""));
    }

    #[test]
    fn test_simulation_delays_override_stages() {
        let delays = SimulationDelays {
            computing_ms: Some(5),
            ..Default::default()
        };
        let config = delays.apply_to(SimulationConfig::default());
        assert_eq!(config.computing, Duration::from_millis(5));
        assert_eq!(config.queued, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_limiter_caps() {
        let config = ResolvedConfig {
            max_parallel: 2,
            operation_limits: HashMap::from([("sonar.scan".to_string(), 1)]),
            ..Default::default()
        };
        let limiter = config.limiter();
        let _scan = limiter.acquire("sonar.scan", 4).await;
        let _status = limiter.acquire("sonar.status", 4).await;
        assert_eq!(limiter.available("sonar.scan"), Some(0));
        assert_eq!(limiter.available("sonar.status"), Some(1));
    }
}
