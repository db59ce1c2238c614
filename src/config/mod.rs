// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for scanflow.
//!
//! Handles loading and merging of configuration from multiple sources:
//! - Global config: ~/.scanflow/config.json
//! - Workspace config: .scanflow.json, .scanflow/config.json, or scanflow.config.json
//! - Environment: SCANFLOW_CACHE_TTL / MCP_CACHE_TTL, SONAR_*, GITHUB_*
//! - CLI options: command-line arguments
//!
//! Configuration is merged with precedence (CLI > environment > workspace > global > defaults).

mod loader;
mod merger;
mod types;

pub use loader::{
    find_workspace_root, get_global_config_dir, get_global_config_path, load_config_file,
    load_env_config, load_global_config, load_workspace_config, save_workspace_config,
    CACHE_TTL_VARS, CONFIG_FILES, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE,
};

pub use merger::{default_config, merge_config, CliOptions};

pub use types::{
    GitHubConfig, PollConfig, ResolvedConfig, SimulationDelays, SonarConfig, WorkspaceConfig,
    DEFAULT_PROJECT, DEFAULT_REPO, KNOWN_OPERATIONS,
};

use crate::error::ConfigError;
use std::path::Path;

/// Load and merge all configuration sources for a workspace.
///
/// This is the main entry point for configuration loading.
pub fn load_config(
    workspace_root: &Path,
    cli_options: CliOptions,
) -> Result<ResolvedConfig, ConfigError> {
    let global = load_global_config()?;
    let workspace = load_workspace_config(workspace_root)?;
    let env = load_env_config(|name| std::env::var(name).ok())?;

    Ok(merge_config(global, workspace, Some(env), cli_options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_with_no_files() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path(), CliOptions::default()).unwrap();
        // Values could come from a global config or the environment
        assert!(!config.sonar_project.is_empty());
    }

    #[test]
    fn test_load_config_cli_override() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".scanflow.json"),
            r#"{"streamTimeoutSecs": 5, "github": {"repo": "acme/web"}}"#,
        )
        .unwrap();

        let cli = CliOptions {
            github_repo: Some("acme/api".to_string()),
            ..Default::default()
        };

        let config = load_config(temp.path(), cli).unwrap();
        assert_eq!(config.stream_timeout_secs, 5);
        assert_eq!(config.github_repo, "acme/api"); // CLI wins
    }
}
