// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use super::types::{ResolvedConfig, WorkspaceConfig};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub cache_ttl_secs: Option<u64>,
    pub max_parallel: Option<usize>,
    pub max_attempts: Option<u32>,
    pub backoff_ms: Option<u64>,
    pub stream_timeout_secs: Option<u64>,
    pub simulation_scale: Option<f64>,
    pub sonar_base_url: Option<String>,
    pub sonar_token: Option<String>,
    pub sonar_project: Option<String>,
    pub github_token: Option<String>,
    pub github_repo: Option<String>,
}

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Environment variables
/// 3. Workspace config (.scanflow.json)
/// 4. Global config (~/.scanflow/config.json)
/// 5. Default values
pub fn merge_config(
    global: Option<WorkspaceConfig>,
    workspace: Option<WorkspaceConfig>,
    env: Option<WorkspaceConfig>,
    cli: CliOptions,
) -> ResolvedConfig {
    let mut result = default_config();

    for config in [global, workspace, env].into_iter().flatten() {
        apply_workspace_config(&mut result, &config);
    }

    apply_cli_options(&mut result, &cli);

    result
}

fn apply_workspace_config(result: &mut ResolvedConfig, config: &WorkspaceConfig) {
    if let Some(ttl) = config.cache_ttl_secs {
        result.cache_ttl_secs = ttl;
    }

    if let Some(max_parallel) = config.max_parallel {
        result.max_parallel = max_parallel;
    }

    if let Some(ref limits) = config.operation_limits {
        result.operation_limits.extend(limits.clone());
    }

    if let Some(ref poll) = config.poll {
        if let Some(attempts) = poll.max_attempts {
            result.poll_max_attempts = attempts;
        }
        if let Some(backoff) = poll.backoff_ms {
            result.poll_backoff_ms = backoff;
        }
        if poll.deadline_ms.is_some() {
            result.poll_deadline_ms = poll.deadline_ms;
        }
    }

    if let Some(timeout) = config.stream_timeout_secs {
        result.stream_timeout_secs = timeout;
    }

    if let Some(ref simulation) = config.simulation {
        result.simulation.merge(simulation);
    }

    if let Some(ref sonar) = config.sonar {
        if sonar.base_url.is_some() {
            result.sonar_base_url = sonar.base_url.clone();
        }
        if sonar.token.is_some() {
            result.sonar_token = sonar.token.clone();
        }
        if sonar.organization.is_some() {
            result.sonar_organization = sonar.organization.clone();
        }
        if let Some(ref project) = sonar.project_key {
            result.sonar_project = project.clone();
        }
        if let Some(ref scanner) = sonar.scanner {
            result.sonar_scanner = scanner.clone();
        }
    }

    if let Some(ref github) = config.github {
        if github.token.is_some() {
            result.github_token = github.token.clone();
        }
        if let Some(ref repo) = github.repo {
            result.github_repo = repo.clone();
        }
        if github.api_url.is_some() {
            result.github_api_url = github.api_url.clone();
        }
    }
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: &CliOptions) {
    if let Some(ttl) = cli.cache_ttl_secs {
        result.cache_ttl_secs = ttl;
    }
    if let Some(max_parallel) = cli.max_parallel {
        result.max_parallel = max_parallel;
    }
    if let Some(attempts) = cli.max_attempts {
        result.poll_max_attempts = attempts;
    }
    if let Some(backoff) = cli.backoff_ms {
        result.poll_backoff_ms = backoff;
    }
    if let Some(timeout) = cli.stream_timeout_secs {
        result.stream_timeout_secs = timeout;
    }
    if let Some(scale) = cli.simulation_scale {
        result.simulation_scale = scale;
    }
    if cli.sonar_base_url.is_some() {
        result.sonar_base_url = cli.sonar_base_url.clone();
    }
    if cli.sonar_token.is_some() {
        result.sonar_token = cli.sonar_token.clone();
    }
    if let Some(ref project) = cli.sonar_project {
        result.sonar_project = project.clone();
    }
    if cli.github_token.is_some() {
        result.github_token = cli.github_token.clone();
    }
    if let Some(ref repo) = cli.github_repo {
        result.github_repo = repo.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{GitHubConfig, PollConfig, SimulationDelays, SonarConfig};
    use std::collections::HashMap;

    #[test]
    fn test_merge_config_defaults() {
        let config = merge_config(None, None, None, CliOptions::default());
        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.poll_max_attempts, 10);
        assert_eq!(config.poll_backoff_ms, 1000);
        assert!(config.sonar_base_url.is_none());
        assert_eq!(config.github_repo, "Tetsukiba/MCP-demo-CSCI-435");
    }

    #[test]
    fn test_merge_config_precedence() {
        let global = WorkspaceConfig {
            cache_ttl_secs: Some(10),
            max_parallel: Some(2),
            ..Default::default()
        };
        let workspace = WorkspaceConfig {
            cache_ttl_secs: Some(20),
            ..Default::default()
        };
        let env = WorkspaceConfig {
            cache_ttl_secs: Some(30),
            ..Default::default()
        };

        let config = merge_config(Some(global.clone()), Some(workspace.clone()), None, CliOptions::default());
        assert_eq!(config.cache_ttl_secs, 20);
        assert_eq!(config.max_parallel, 2);

        let config = merge_config(Some(global.clone()), Some(workspace.clone()), Some(env.clone()), CliOptions::default());
        assert_eq!(config.cache_ttl_secs, 30);

        let cli = CliOptions {
            cache_ttl_secs: Some(40),
            ..Default::default()
        };
        let config = merge_config(Some(global), Some(workspace), Some(env), cli);
        assert_eq!(config.cache_ttl_secs, 40); // CLI wins
    }

    #[test]
    fn test_merge_operation_limits() {
        let global = WorkspaceConfig {
            operation_limits: Some(HashMap::from([
                ("sonar.scan".to_string(), 1),
                ("sonar.status".to_string(), 8),
            ])),
            ..Default::default()
        };
        let workspace = WorkspaceConfig {
            operation_limits: Some(HashMap::from([("sonar.scan".to_string(), 2)])),
            ..Default::default()
        };

        let config = merge_config(Some(global), Some(workspace), None, CliOptions::default());
        assert_eq!(config.operation_limits["sonar.scan"], 2);
        assert_eq!(config.operation_limits["sonar.status"], 8);
    }

    #[test]
    fn test_merge_poll_and_simulation() {
        let workspace = WorkspaceConfig {
            poll: Some(PollConfig {
                max_attempts: Some(3),
                backoff_ms: None,
                deadline_ms: Some(5000),
            }),
            simulation: Some(SimulationDelays {
                queued_ms: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(None, Some(workspace), None, CliOptions::default());
        let budget = config.poll_budget();
        assert_eq!(budget.max_attempts, 3);
        assert_eq!(budget.backoff.as_millis(), 1000);
        assert_eq!(budget.deadline.unwrap().as_millis(), 5000);
        assert_eq!(config.simulation_config().queued.as_millis(), 1);
    }

    #[test]
    fn test_merge_sonar_and_github() {
        let workspace = WorkspaceConfig {
            sonar: Some(SonarConfig {
                base_url: Some("https://sonarcloud.io".to_string()),
                organization: Some("acme".to_string()),
                ..Default::default()
            }),
            github: Some(GitHubConfig {
                repo: Some("acme/web".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let env = WorkspaceConfig {
            sonar: Some(SonarConfig {
                token: Some("squ_env".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let cli = CliOptions {
            github_token: Some("ghp_cli".to_string()),
            sonar_project: Some("web".to_string()),
            ..Default::default()
        };

        let config = merge_config(None, Some(workspace), Some(env), cli);
        assert_eq!(config.sonar_url(), "https://sonarcloud.io");
        assert_eq!(config.sonar_token.as_deref(), Some("squ_env"));
        assert_eq!(config.sonar_organization.as_deref(), Some("acme"));
        assert_eq!(config.sonar_project, "web");
        assert_eq!(config.github_repo, "acme/web");
        assert_eq!(config.github_token.as_deref(), Some("ghp_cli"));
    }
}
