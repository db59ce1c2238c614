// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Design-source collaborator.
//!
//! A design reference (`file_key`, `node_id`) goes in, generated component
//! source comes out. The pipeline only depends on [`DesignSource`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::WorkflowError;
use crate::monitor::AttachMeta;

static DESIGN_URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"figma\.com/design/([^/]+)/[^?]*\?node-id=([^&]+)").expect("valid regex")
});

/// Directory generated components are written under.
pub const COMPONENT_DIR: &str = "src/components";

/// A node inside a design file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignRef {
    pub file_key: String,
    /// Node id in `a:b` form.
    pub node_id: String,
}

impl DesignRef {
    pub fn new(file_key: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            file_key: file_key.into(),
            node_id: node_id.into(),
        }
    }

    /// Node id with `:` replaced, safe for branch names.
    pub fn node_slug(&self) -> String {
        self.node_id.replace(':', "-")
    }
}

impl std::fmt::Display for DesignRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.file_key, self.node_id)
    }
}

/// Parse `https://figma.com/design/<key>/<name>?node-id=<a-b>`.
///
/// The URL form of a node id uses `-`; the returned id uses `:`.
pub fn parse_design_url(url: &str) -> Result<DesignRef, WorkflowError> {
    let caps = DESIGN_URL_PATTERN.captures(url).ok_or_else(|| {
        WorkflowError::InvalidDesignUrl(format!(
            "{url} (expected https://figma.com/design/FILE_KEY/NAME?node-id=NODE_ID)"
        ))
    })?;
    Ok(DesignRef::new(&caps[1], caps[2].replace('-', ":")))
}

/// Generated source for one design node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignArtifact {
    pub code: String,
    pub component_name: String,
    #[serde(default = "default_component_type")]
    pub component_type: String,
}

fn default_component_type() -> String {
    "COMPONENT".to_string()
}

impl AttachMeta for DesignArtifact {}

impl DesignArtifact {
    pub fn new(component_name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            component_name: component_name.into(),
            component_type: default_component_type(),
        }
    }

    /// The component plus a smoke test, keyed by repository path.
    pub fn files(&self) -> BTreeMap<String, String> {
        let name = &self.component_name;
        let mut files = BTreeMap::new();
        files.insert(format!("{COMPONENT_DIR}/{name}.tsx"), self.code.clone());
        files.insert(format!("{COMPONENT_DIR}/{name}.test.tsx"), component_test(name));
        files
    }
}

/// A render smoke test for `name`.
pub fn component_test(name: &str) -> String {
    format!(
        "import {{ render }} from '@testing-library/react';\n\
         import {{ {name} }} from './{name}';\n\
         \n\
         describe('{name}', () => {{\n\
         \x20 it('renders without crashing', () => {{\n\
         \x20   render(<{name} />);\n\
         \x20 }});\n\
         }});\n"
    )
}

/// Source of generated component code.
#[async_trait]
pub trait DesignSource: Send + Sync {
    async fn fetch(&self, design: &DesignRef) -> Result<DesignArtifact, WorkflowError>;
}

const LOGIN_FORM: &str = r#"import React from 'react';

export const LoginForm = () => {
  const handleSubmit = (e) => {
    e.preventDefault();
    console.log('Form submitted');
  };

  return (
    <form onSubmit={handleSubmit} className="login-form">
      <h2>Login</h2>
      <input type="email" placeholder="Email" />
      <input type="password" placeholder="Password" />
      <button type="submit">Sign In</button>
    </form>
  );
};
"#;

/// Returns one fixed artifact after a short delay, for any reference.
#[derive(Debug, Clone)]
pub struct StaticDesignSource {
    artifact: DesignArtifact,
    latency: Duration,
}

impl Default for StaticDesignSource {
    fn default() -> Self {
        Self {
            artifact: DesignArtifact::new("LoginForm", LOGIN_FORM),
            latency: Duration::from_millis(500),
        }
    }
}

impl StaticDesignSource {
    pub fn new(artifact: DesignArtifact) -> Self {
        Self {
            artifact,
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl DesignSource for StaticDesignSource {
    async fn fetch(&self, design: &DesignRef) -> Result<DesignArtifact, WorkflowError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        debug!(design = %design, component = %self.artifact.component_name, "Fetched design");
        Ok(self.artifact.clone())
    }
}
