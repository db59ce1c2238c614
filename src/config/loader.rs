// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files and the environment.
//!
//! Handles loading configuration from JSON and YAML files in various locations.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::{GitHubConfig, SonarConfig, WorkspaceConfig};

/// Config file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &[".scanflow.json", ".scanflow/config.json", "scanflow.config.json"];

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".scanflow";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// Environment variables for the cache TTL, first match wins.
pub const CACHE_TTL_VARS: &[&str] = &["SCANFLOW_CACHE_TTL", "MCP_CACHE_TTL"];

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// Get the global config file path.
pub fn get_global_config_path() -> Option<PathBuf> {
    get_global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Load global configuration from ~/.scanflow/config.json.
pub fn load_global_config() -> Result<Option<WorkspaceConfig>, ConfigError> {
    let path = match get_global_config_path() {
        Some(p) => p,
        None => return Ok(None),
    };

    if !path.exists() {
        return Ok(None);
    }

    load_config_file(&path).map(Some)
}

/// Load workspace configuration from the workspace root.
///
/// Searches for config files in the following order:
/// 1. .scanflow.json
/// 2. .scanflow/config.json
/// 3. scanflow.config.json
pub fn load_workspace_config(workspace_root: &Path) -> Result<Option<WorkspaceConfig>, ConfigError> {
    for filename in CONFIG_FILES {
        let path = workspace_root.join(filename);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<WorkspaceConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}

/// Build a config layer from environment variables.
///
/// `lookup` is usually `std::env::var(..).ok()`; empty values count as unset.
pub fn load_env_config<F>(lookup: F) -> Result<WorkspaceConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let mut config = WorkspaceConfig::default();

    if let Some((name, raw)) = CACHE_TTL_VARS.iter().find_map(|name| var(name).map(|v| (*name, v))) {
        let ttl = raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
            field: name.to_string(),
            message: format!("{raw:?} is not a number of seconds: {e}"),
        })?;
        config.cache_ttl_secs = Some(ttl);
    }

    let sonar = SonarConfig {
        base_url: var("SONAR_BASE_URL"),
        token: var("SONAR_TOKEN"),
        organization: var("SONAR_ORGANIZATION"),
        project_key: var("SONAR_PROJECT"),
        scanner: None,
    };
    if sonar.base_url.is_some()
        || sonar.token.is_some()
        || sonar.organization.is_some()
        || sonar.project_key.is_some()
    {
        config.sonar = Some(sonar);
    }

    let github = GitHubConfig {
        token: var("GITHUB_TOKEN"),
        repo: var("GITHUB_REPO"),
        api_url: None,
    };
    if github.token.is_some() || github.repo.is_some() {
        config.github = Some(github);
    }

    Ok(config)
}

/// Save workspace configuration to a file.
pub fn save_workspace_config(
    workspace_root: &Path,
    config: &WorkspaceConfig,
    filename: Option<&str>,
) -> Result<PathBuf, ConfigError> {
    let filename = filename.unwrap_or(CONFIG_FILES[0]);
    let path = workspace_root.join(filename);

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;

    Ok(path)
}

/// Find the workspace root by searching for config files.
///
/// Walks up the directory tree from `start` until it finds a directory
/// containing a config file or reaches the filesystem root.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        for filename in CONFIG_FILES {
            if current.join(filename).exists() {
                return Some(current);
            }
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return None,
        }
    }
}
