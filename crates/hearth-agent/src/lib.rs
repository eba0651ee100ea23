//! Request handling for Hearth.
//!
//! A [`DispatchLoop`] turns a natural-language instruction into tool calls
//! against the device tools and returns the reasoner's final answer. The
//! reasoner is pluggable; [`OllamaReasoner`] talks to a local Ollama server.

pub mod dispatch;
pub mod error;
#[cfg(feature = "ollama")]
pub mod ollama;
pub mod prompts;

pub use dispatch::{DispatchConfig, DispatchLoop, DispatchOutcome, DispatchState};
pub use error::Result;
#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaReasoner};
pub use prompts::DEFAULT_SYSTEM_PROMPT;
