//! Error types for the tools crate.

pub use hearth_core::error::Error as HearthError;

/// Tool error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// Tool not found
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// Invalid arguments
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for tool operations.
pub type Result<T> = std::result::Result<T, ToolError>;

impl From<ToolError> for HearthError {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::NotFound(s) => HearthError::NotFound(s),
            ToolError::InvalidArguments(s) => HearthError::Validation(s),
            ToolError::Serialization(s) => HearthError::Serialization(s),
        }
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        ToolError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ToolError::NotFound("lamp_tool".to_string());
        assert_eq!(err.to_string(), "Tool not found: lamp_tool");
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{light").unwrap_err();
        let tool_err: ToolError = json_err.into();
        assert!(matches!(tool_err, ToolError::Serialization(_)));
    }

    #[test]
    fn test_into_core_error() {
        let err: HearthError = ToolError::InvalidArguments("device".to_string()).into();
        assert!(matches!(err, HearthError::Validation(_)));

        let err: HearthError = ToolError::NotFound("fan_speed".to_string()).into();
        assert!(matches!(err, HearthError::NotFound(_)));
    }
}
