//! Error types for the agent crate.
//!
//! This module re-exports the unified error type from core.

pub use hearth_core::error::Error as HearthError;
pub use hearth_core::error::Result as CoreResult;

/// Result type for agent operations.
pub type Result<T> = CoreResult<T>;

/// Convert from a reasoner transport failure.
pub fn from_llm_err(err: impl std::fmt::Display) -> HearthError {
    HearthError::Llm(err.to_string())
}
