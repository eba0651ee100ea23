//! Core traits and types for Hearth.
//!
//! This crate defines the pieces shared by the device, tool and agent crates:
//! the unified error type, configuration, chat messages and the reasoner
//! abstraction.

pub mod config;
pub mod error;
pub mod llm;
pub mod message;

pub use config::HearthConfig;
pub use error::{Error, Result};
pub use llm::{Decision, DynReasoner, Reasoner, ToolDefinition};
pub use message::{Message, MessageRole, ToolInvocation};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
