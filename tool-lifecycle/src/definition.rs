//! Tool definitions submitted by agents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tool_primitives::{ContentHash, Language, ToolId};

/// Constraint attached to a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Rule kind, e.g. `min_length` or `pattern`.
    pub rule_type: String,
    /// Rule argument.
    pub value: Value,
    /// Message reported when the rule fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Declared input parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// JSON type name.
    #[serde(rename = "type")]
    pub param_type: String,
    /// Human-readable description.
    pub description: String,
    /// Whether callers must supply the parameter.
    #[serde(default)]
    pub required: bool,
    /// Value used when the parameter is omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Additional constraints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation: Vec<ValidationRule>,
}

impl ParameterSchema {
    /// Creates an optional parameter.
    #[must_use]
    pub fn new(param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            param_type: param_type.into(),
            description: description.into(),
            required: false,
            default: None,
            validation: Vec::new(),
        }
    }

    /// Marks the parameter as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets a default value.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Declared return value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSchema {
    /// JSON type name.
    #[serde(rename = "type")]
    pub return_type: String,
    /// Human-readable description.
    pub description: String,
    /// Object properties, for structured returns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
}

impl ReturnSchema {
    /// Creates a return schema.
    #[must_use]
    pub fn new(return_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            return_type: return_type.into(),
            description: description.into(),
            properties: None,
        }
    }
}

/// Parameters and return type of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Parameters by name.
    pub parameters: BTreeMap<String, ParameterSchema>,
    /// Return value.
    pub returns: ReturnSchema,
}

impl ToolSchema {
    /// Creates a schema without parameters.
    #[must_use]
    pub fn new(returns: ReturnSchema) -> Self {
        Self {
            parameters: BTreeMap::new(),
            returns,
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, parameter: ParameterSchema) -> Self {
        self.parameters.insert(name.into(), parameter);
        self
    }

    /// Names of required parameters, sorted.
    #[must_use]
    pub fn required_parameters(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|(_, parameter)| parameter.required)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Renders an OpenAPI 3.0 document exposing the tool as a single
    /// `POST /tools/{id}/execute` operation.
    #[must_use]
    pub fn to_openapi(&self, tool_id: ToolId, name: &str, description: &str, version: &str) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|(name, parameter)| {
                let mut property = json!({
                    "type": parameter.param_type,
                    "description": parameter.description,
                });
                if let (Some(default), Some(object)) =
                    (&parameter.default, property.as_object_mut())
                {
                    object.insert("default".to_owned(), default.clone());
                }
                (name.clone(), property)
            })
            .collect();

        json!({
            "openapi": "3.0.0",
            "info": {
                "title": name,
                "description": description,
                "version": version,
            },
            "paths": {
                format!("/tools/{tool_id}/execute"): {
                    "post": {
                        "summary": description,
                        "description": description,
                        "operationId": format!("execute_{tool_id}"),
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": properties,
                                        "required": self.required_parameters(),
                                    }
                                }
                            }
                        },
                        "responses": {
                            "200": {
                                "description": "Successful execution",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": self.returns.return_type,
                                            "description": self.returns.description,
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        })
    }
}

/// Complete tool submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// Caller-chosen version label.
    pub version: String,
    /// Source language.
    pub language: Language,
    /// Source code.
    pub code: String,
    /// Declared interface.
    pub schema: ToolSchema,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ToolDefinition {
    /// Creates a definition with empty metadata.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
        language: Language,
        code: impl Into<String>,
        schema: ToolSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: version.into(),
            language,
            code: code.into(),
            schema,
            metadata: Map::new(),
        }
    }

    /// Checks that required fields are present, returning one message per
    /// problem. Empty means the structure is sound.
    #[must_use]
    pub fn validate_structure(&self) -> Vec<String> {
        let checks = [
            (&self.name, "Tool name is required"),
            (&self.description, "Tool description is required"),
            (&self.version, "Tool version is required"),
            (&self.code, "Tool code is required"),
        ];
        checks
            .into_iter()
            .filter(|(value, _)| value.trim().is_empty())
            .map(|(_, message)| message.to_owned())
            .collect()
    }

    /// Content hash of the code.
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::compute(self.language, &self.code)
    }
}
