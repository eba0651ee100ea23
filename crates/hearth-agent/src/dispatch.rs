//! Reason/act dispatch loop.
//!
//! Each request starts a fresh exchange. The loop alternates between asking
//! the reasoner what to do and running the tools it asked for, until the
//! reasoner produces an answer or the turn cap is hit.

use std::sync::Arc;

use hearth_core::config::AgentSettings;
use hearth_core::llm::{Decision, DynReasoner};
use hearth_core::message::{Message, ToolInvocation};
use hearth_core::Error;
use hearth_tools::ToolRegistry;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::prompts;

/// Loop limits and prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Maximum reasoning turns per request.
    pub max_turns: usize,
    /// Overrides the built-in system prompt.
    pub system_prompt: Option<String>,
    /// Send no system message at all.
    pub omit_system_prompt: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::from(&AgentSettings::default())
    }
}

impl From<&AgentSettings> for DispatchConfig {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            max_turns: settings.max_turns,
            system_prompt: settings.system_prompt.clone(),
            omit_system_prompt: false,
        }
    }
}

/// Where the loop currently is.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchState {
    Reason,
    Act(Vec<ToolInvocation>),
    Done(String),
}

/// A finished request.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub answer: String,
    /// Reasoning turns used.
    pub turns: usize,
    /// Full exchange, including the initial messages.
    pub history: Vec<Message>,
}

pub struct DispatchLoop {
    reasoner: DynReasoner,
    tools: Arc<ToolRegistry>,
    config: DispatchConfig,
}

impl DispatchLoop {
    pub fn new(reasoner: DynReasoner, tools: Arc<ToolRegistry>) -> Self {
        Self {
            reasoner,
            tools,
            config: DispatchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    fn initial_history(&self, instruction: &str) -> Vec<Message> {
        let mut history = Vec::with_capacity(2);
        if !self.config.omit_system_prompt {
            let prompt = prompts::system_prompt(self.config.system_prompt.as_deref());
            history.push(Message::system(prompt));
        }
        history.push(Message::user(instruction));
        history
    }

    /// Run one request to completion.
    ///
    /// Tool failures never end the loop; they are recorded as tool results.
    /// Reasoner failures and turn overrun are returned as errors.
    pub async fn run(&self, instruction: &str) -> Result<DispatchOutcome> {
        info!("Dispatching request via {}: {}", self.reasoner.name(), instruction);

        let definitions = self.tools.definitions();
        let mut history = self.initial_history(instruction);
        let mut turns = 0usize;
        let mut state = DispatchState::Reason;

        loop {
            state = match state {
                DispatchState::Reason => {
                    if turns >= self.config.max_turns {
                        warn!("Request aborted after {} reasoning turns", turns);
                        return Err(Error::TurnLimitExceeded(self.config.max_turns));
                    }
                    turns += 1;

                    match self.reasoner.decide(&history, &definitions).await? {
                        Decision::Answer(text) => {
                            history.push(Message::assistant(text.clone()));
                            DispatchState::Done(text)
                        }
                        Decision::Invoke { content, calls } if calls.is_empty() => {
                            history.push(Message::assistant(content.clone()));
                            DispatchState::Done(content)
                        }
                        Decision::Invoke { content, calls } => {
                            debug!("Turn {}: {} tool call(s)", turns, calls.len());
                            history.push(Message::assistant_with_calls(content, calls.clone()));
                            DispatchState::Act(calls)
                        }
                    }
                }
                DispatchState::Act(calls) => {
                    for call in &calls {
                        let result = self.tools.execute_call(call).await;
                        let text = result.text();
                        debug!("Tool {} -> {}", result.name, text);
                        history.push(Message::tool(result.name, text));
                    }
                    DispatchState::Reason
                }
                DispatchState::Done(answer) => {
                    info!("Request finished after {} turn(s)", turns);
                    return Ok(DispatchOutcome {
                        answer,
                        turns,
                        history,
                    });
                }
            };
        }
    }

    /// Like [`run`](Self::run), but failures become a sentence for the user.
    pub async fn answer(&self, instruction: &str) -> String {
        match self.run(instruction).await {
            Ok(outcome) => outcome.answer,
            Err(Error::TurnLimitExceeded(n)) => format!(
                "Sorry, I could not finish this request within {} steps. Please try again.",
                n
            ),
            Err(e) => {
                error!("Request failed: {}", e);
                format!("Sorry, I could not complete the request: {}", e)
            }
        }
    }
}
