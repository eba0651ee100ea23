//! Ollama reasoner backend.
//!
//! Talks to Ollama's native `/api/chat` endpoint without streaming and with
//! native tool definitions. The whole history is sent on every turn.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use hearth_core::config::{endpoints, models, normalize_ollama_endpoint, LlmSettings};
use hearth_core::llm::{Decision, Reasoner, ToolDefinition};
use hearth_core::message::{Message, MessageRole, ToolInvocation};
use hearth_core::Error;

use crate::error::{from_llm_err, Result};

/// Ollama configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OllamaConfig {
    /// Ollama endpoint (default: http://localhost:11434)
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl OllamaConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoints::OLLAMA.to_string(),
            model: model.into(),
            temperature: 0.0,
            timeout_secs: 180,
        }
    }

    /// Set a custom endpoint. A trailing `/v1` is stripped since the native
    /// API is used.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = normalize_ollama_endpoint(endpoint.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self::new(models::OLLAMA_DEFAULT)
    }
}

impl From<&LlmSettings> for OllamaConfig {
    fn from(settings: &LlmSettings) -> Self {
        Self {
            endpoint: normalize_ollama_endpoint(settings.endpoint.clone()),
            model: settings.model.clone(),
            temperature: settings.temperature,
            timeout_secs: settings.timeout_secs,
        }
    }
}

/// [`Reasoner`] backed by a local Ollama server.
pub struct OllamaReasoner {
    config: OllamaConfig,
    client: Client,
}

impl OllamaReasoner {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        tracing::debug!("Creating Ollama reasoner with endpoint: {}", config.endpoint);

        let client = Client::builder()
            .timeout(config.timeout())
            .pool_max_idle_per_host(2)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn build_request(&self, history: &[Message], tools: &[ToolDefinition]) -> OllamaChatRequest {
        let tools = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|tool| OllamaTool {
                        tool_type: "function".to_string(),
                        function: OllamaToolFunction {
                            name: tool.name.clone(),
                            description: tool.description.clone(),
                            parameters: tool.parameters.clone(),
                        },
                    })
                    .collect(),
            )
        };

        OllamaChatRequest {
            model: self.config.model.clone(),
            messages: history.iter().map(OllamaMessage::from).collect(),
            stream: false,
            options: Some(OllamaOptions {
                temperature: Some(self.config.temperature),
            }),
            tools,
        }
    }
}

#[async_trait]
impl Reasoner for OllamaReasoner {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn decide(&self, history: &[Message], tools: &[ToolDefinition]) -> Result<Decision> {
        let url = format!("{}/api/chat", self.config.endpoint);
        let request = self.build_request(history, tools);
        tracing::debug!(
            "Ollama: sending {} message(s) to model {}",
            request.messages.len(),
            request.model
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(from_llm_err(format!(
                "Ollama API error {}: {}",
                status.as_u16(),
                body
            )));
        }

        parse_response(&body)
    }
}

/// Turn a non-streaming chat response into a decision.
fn parse_response(body: &str) -> Result<Decision> {
    let response: OllamaChatResponse = serde_json::from_str(body)?;
    let message = response.message;

    if message.tool_calls.is_empty() {
        return Ok(Decision::Answer(message.content));
    }

    tracing::debug!("Ollama: model requested {} tool call(s)", message.tool_calls.len());
    let calls = message
        .tool_calls
        .into_iter()
        .map(|call| {
            let invocation = ToolInvocation::new(call.function.name, call.function.arguments);
            match call.id {
                Some(id) => invocation.with_id(id),
                None => invocation,
            }
        })
        .collect();

    Ok(Decision::Invoke {
        content: message.content,
        calls,
    })
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OllamaTool>>,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
    /// Tool calls made by the assistant in earlier turns
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<serde_json::Value>>,
    /// For role "tool": which tool this result is for
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

impl From<&Message> for OllamaMessage {
    fn from(msg: &Message) -> Self {
        let role = match msg.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };

        let tool_calls = if msg.has_tool_calls() {
            Some(
                msg.tool_calls
                    .iter()
                    .map(|call| {
                        serde_json::json!({
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments,
                            }
                        })
                    })
                    .collect(),
            )
        } else {
            None
        };

        Self {
            role: role.to_string(),
            content: msg.content.clone(),
            tool_calls,
            tool_name: msg.tool_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OllamaToolFunction,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Debug, Deserialize, Default)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    id: Option<String>,
    function: OllamaCalledFunction,
}

#[derive(Debug, Deserialize)]
struct OllamaCalledFunction {
    name: String,
    /// Either a JSON object or a string holding one
    #[serde(deserialize_with = "deserialize_arguments")]
    arguments: serde_json::Value,
}

fn deserialize_arguments<'de, D>(deserializer: D) -> std::result::Result<serde_json::Value, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(raw) => serde_json::from_str(&raw).map_err(serde::de::Error::custom),
        other => Ok(other),
    }
}
