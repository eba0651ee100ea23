//! Core tool trait and types for function calling.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use hearth_core::llm::ToolDefinition;

use super::error::{Result, ToolError};

/// Tool execution result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Whether the execution was successful
    pub success: bool,
    /// The result data
    pub data: Value,
    /// Optional error message if success is false
    pub error: Option<String>,
}

impl ToolOutput {
    /// Create a successful output.
    pub fn success(data: impl Into<Value>) -> Self {
        Self {
            success: true,
            data: data.into(),
            error: None,
        }
    }

    /// Create a failed output.
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
        }
    }

    /// Text handed back to the reasoner.
    ///
    /// String data is used verbatim, other JSON is serialized, and failures
    /// yield their error message.
    pub fn text(&self) -> String {
        if !self.success {
            return self.error.clone().unwrap_or_default();
        }
        match &self.data {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Tool trait for function calling.
///
/// Tools are callable functions that the reasoner can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name.
    fn name(&self) -> &str;

    /// Get the tool description.
    fn description(&self) -> &str;

    /// Get the parameters as JSON Schema.
    fn parameters(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value) -> Result<ToolOutput>;

    /// Get the full tool definition.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }

    /// Validate arguments before execution.
    fn validate_args(&self, args: &Value) -> Result<()> {
        let args_obj = args
            .as_object()
            .ok_or_else(|| ToolError::InvalidArguments("Expected object".to_string()))?;

        let params = self.parameters();
        let required = params
            .get("required")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        for req in required.iter().filter_map(|r| r.as_str()) {
            if !args_obj.contains_key(req) {
                return Err(ToolError::InvalidArguments(format!(
                    "Missing required parameter: {}",
                    req
                )));
            }
        }
        Ok(())
    }
}

/// Dynamic tool wrapper for trait objects.
pub type DynTool = Arc<dyn Tool>;

/// Helper function to create a JSON object schema for parameters.
pub fn object_schema(properties: Value, required: Vec<String>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

/// Helper function to create a simple property definition.
pub fn property(prop_type: &str, description: &str) -> Value {
    serde_json::json!({
        "type": prop_type,
        "description": description
    })
}

pub fn string_property(description: &str) -> Value {
    property("string", description)
}

pub fn integer_property(description: &str) -> Value {
    property("integer", description)
}

/// String property restricted to `values`.
pub fn enum_property(description: &str, values: &[&str]) -> Value {
    serde_json::json!({
        "type": "string",
        "description": description,
        "enum": values
    })
}

/// Required string argument.
pub fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments(format!("'{}' must be a string", key)))
}
