// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool definitions advertised to callers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// JSON Schema for tool input parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String, // Always "object"
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl InputSchema {
    /// Create a new input schema with object type.
    pub fn new() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: BTreeMap::new(),
            required: None,
        }
    }

    /// Add a property to the schema.
    pub fn with_property(mut self, name: impl Into<String>, schema: serde_json::Value) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Mark properties as required.
    pub fn with_required(mut self, required: &[&str]) -> Self {
        self.required = Some(required.iter().map(|s| s.to_string()).collect());
        self
    }
}

impl Default for InputSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// Name, description and input schema of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: InputSchema::new(),
        }
    }

    pub fn with_schema(mut self, schema: InputSchema) -> Self {
        self.input_schema = schema;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_serializes_as_json_schema() {
        let def = ToolDefinition::new("sonar.status", "Poll a task").with_schema(
            InputSchema::new()
                .with_property("task_id", json!({"type": "string"}))
                .with_required(&["task_id"]),
        );

        let value = serde_json::to_value(&def).unwrap();
        assert_eq!(value["input_schema"]["type"], "object");
        assert_eq!(value["input_schema"]["required"], json!(["task_id"]));
        assert_eq!(value["input_schema"]["properties"]["task_id"]["type"], "string");
    }
}
