//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are the domain actions the model may request: ticket lookup,
//! ticket creation, knowledge-base search and so on. Each one describes its
//! parameters with a [`ParamSchema`] and declares whether it is read-only.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::error::ToolFailure;
use crate::message::Arguments;

/// A recursive, JSON-Schema-like parameter description.
///
/// Serializes directly to the JSON Schema subset model APIs accept
/// (`{"type": "object", "properties": {...}, "required": [...]}`).
/// Provider adapters rewrite it into their own dialect at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamSchema {
    Object {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default)]
        properties: BTreeMap<String, ParamSchema>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        required: Vec<String>,
    },
    String {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
        allowed: Vec<String>,
    },
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Boolean {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Array {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        items: Box<ParamSchema>,
    },
}

impl ParamSchema {
    /// An empty object schema; add fields with [`ParamSchema::property`].
    pub fn object() -> Self {
        Self::Object {
            description: None,
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::String {
            description: Some(description.into()),
            allowed: Vec::new(),
        }
    }

    pub fn string_enum<S: Into<String>>(description: impl Into<String>, allowed: impl IntoIterator<Item = S>) -> Self {
        Self::String {
            description: Some(description.into()),
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::Integer { description: Some(description.into()) }
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::Number { description: Some(description.into()) }
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::Boolean { description: Some(description.into()) }
    }

    pub fn array(description: impl Into<String>, items: ParamSchema) -> Self {
        Self::Array {
            description: Some(description.into()),
            items: Box::new(items),
        }
    }

    /// Add a property to an object schema. No-op for other variants.
    pub fn property(mut self, name: impl Into<String>, schema: ParamSchema, is_required: bool) -> Self {
        if let Self::Object { properties, required, .. } = &mut self {
            let name = name.into();
            if is_required && !required.contains(&name) {
                required.push(name.clone());
            }
            properties.insert(name, schema);
        }
        self
    }

    /// The JSON Schema value for this description.
    pub fn to_json_schema(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
    }
}

/// What the model is told about a tool. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_schema: Option<ParamSchema>,
    #[serde(default)]
    pub read_only: bool,
}

impl ToolDescriptor {
    /// Parameters as JSON Schema, defaulting to an empty object.
    pub fn parameters_json(&self) -> serde_json::Value {
        self.parameter_schema
            .as_ref()
            .map(ParamSchema::to_json_schema)
            .unwrap_or_else(|| serde_json::json!({ "type": "object", "properties": {} }))
    }
}

/// The core Tool trait.
///
/// Only the execution wrapper in `deskpilot-tools` calls [`Tool::execute`];
/// it validates arguments, enforces the deadline and shapes the output.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "list_my_tickets").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// Parameter description, or `None` when the tool takes no arguments.
    fn parameter_schema(&self) -> Option<ParamSchema>;

    /// Read-only tools never mutate external state and may run concurrently.
    fn is_read_only(&self) -> bool;

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, arguments: &Arguments) -> std::result::Result<Arguments, ToolFailure>;

    fn to_descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameter_schema: self.parameter_schema(),
            read_only: self.is_read_only(),
        }
    }
}
