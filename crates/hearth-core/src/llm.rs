//! Reasoner abstraction.
//!
//! The dispatch loop never talks to a model directly. It hands the exchange
//! history and the available tool definitions to a [`Reasoner`] and gets back
//! either a final answer or a set of tool invocations.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::message::{Message, ToolInvocation};

/// Tool description advertised to the reasoner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

/// Outcome of one reasoning step.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Terminal natural-language answer.
    Answer(String),
    /// Run these tools, then reason again. With no calls, `content` is
    /// taken as the answer.
    Invoke {
        /// Any text the model produced alongside the calls.
        content: String,
        calls: Vec<ToolInvocation>,
    },
}

impl Decision {
    pub fn answer(text: impl Into<String>) -> Self {
        Self::Answer(text.into())
    }

    pub fn invoke(calls: Vec<ToolInvocation>) -> Self {
        Self::Invoke {
            content: String::new(),
            calls,
        }
    }
}

/// Decides the next step of a dispatch exchange.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    async fn decide(&self, history: &[Message], tools: &[ToolDefinition]) -> Result<Decision>;
}

pub type DynReasoner = Arc<dyn Reasoner>;
