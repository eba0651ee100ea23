//! Unified error handling for Hearth.
//!
//! Every crate keeps its own narrow error enum and converts into this one at
//! crate boundaries.

/// Unified error type for Hearth.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reasoner (LLM) errors.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Device-related errors.
    #[error("Device error: {0}")]
    Device(String),

    /// Network-related errors.
    #[error("Network error: {0}")]
    Network(String),

    /// Validation errors.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The dispatch loop hit its reasoning turn cap without a final answer.
    #[error("Dispatch loop exceeded {0} reasoning turns without an answer")]
    TurnLimitExceeded(usize),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Not found errors.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("light");
        assert!(err.to_string().contains("light"));
    }

    #[test]
    fn test_turn_limit_display() {
        let err = Error::TurnLimitExceeded(100);
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("broker = ").unwrap_err();
        let err: Error = toml_err.into();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
