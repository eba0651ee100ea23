//! Configuration defaults and loading.
//!
//! Defaults live in small constant modules so every crate reads the same
//! values. [`HearthConfig`] bundles them into one serde structure that can be
//! read from a TOML file and then overridden from the environment.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default endpoint constants.
pub mod endpoints {
    pub const OLLAMA: &str = "http://localhost:11434";
}

/// Default model constants.
pub mod models {
    pub const OLLAMA_DEFAULT: &str = "llama3.1:8b";
}

/// MQTT connection defaults.
pub mod mqtt {
    pub const DEFAULT_BROKER: &str = "test.mosquitto.org";
    pub const DEFAULT_PORT: u16 = 1883;
    pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;
    pub const CLIENT_ID_PREFIX: &str = "hearth_client";
}

/// Default topic names.
pub mod topics {
    pub const LIGHT_READING: &str = "device/light/reading";
    pub const DOOR_READING: &str = "device/door/reading";
    pub const LIGHT_COMMAND: &str = "device/light/command";
    pub const DOOR_COMMAND: &str = "device/door/command";
}

/// Retry, settle and reconnect timing.
pub mod timing {
    /// Refresh probes allowed per query chain.
    pub const MAX_RETRY: i32 = 3;
    /// Wait after a command or probe before re-reading the store.
    pub const SETTLE_MS: u64 = 2_000;
    /// Gap between the subscribe/probe steps after a connection comes up.
    pub const STARTUP_STEP_MS: u64 = 1_000;
    pub const FIRST_RECONNECT_DELAY_SECS: u64 = 1;
    pub const RECONNECT_RATE: u32 = 2;
    pub const MAX_RECONNECT_DELAY_SECS: u64 = 60;
    pub const MAX_RECONNECT_COUNT: u32 = 12;
}

/// Dispatch loop defaults.
pub mod agent {
    /// Hard cap on reasoning turns per request.
    pub const DEFAULT_MAX_TURNS: usize = 100;
    pub const DEFAULT_TEMPERATURE: f32 = 0.0;
    /// Reasoner request timeout in seconds.
    pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 180;
}

/// Environment variable names.
pub mod env_vars {
    pub const CONFIG: &str = "HEARTH_CONFIG";
    pub const LOG_JSON: &str = "HEARTH_LOG_JSON";
    pub const MQTT_BROKER: &str = "MQTT_BROKER";
    pub const MQTT_PORT: &str = "MQTT_PORT";
    pub const MQTT_USERNAME: &str = "MQTT_USERNAME";
    pub const MQTT_PASSWORD: &str = "MQTT_PASSWORD";
    pub const OLLAMA_ENDPOINT: &str = "OLLAMA_ENDPOINT";
    pub const LLM_MODEL: &str = "LLM_MODEL";
    pub const AGENT_MAX_TURNS: &str = "AGENT_MAX_TURNS";
}

/// Strip a trailing `/v1` and slashes; Ollama's native API has no version prefix.
pub fn normalize_ollama_endpoint(endpoint: String) -> String {
    let mut endpoint = endpoint;
    if endpoint.ends_with("/v1") || endpoint.ends_with("/v1/") {
        endpoint = endpoint.replace("/v1", "");
    }
    endpoint.trim_end_matches('/').to_string()
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub broker: String,
    pub port: u16,
    /// Random `hearth_client_<n>` id when unset.
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker: mqtt::DEFAULT_BROKER.to_string(),
            port: mqtt::DEFAULT_PORT,
            client_id: None,
            username: None,
            password: None,
            keep_alive_secs: mqtt::DEFAULT_KEEP_ALIVE_SECS,
        }
    }
}

impl MqttSettings {
    pub fn new(broker: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn full_broker_addr(&self) -> String {
        format!("{}:{}", self.broker, self.port)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Telemetry and command topics for the two devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicSettings {
    pub light_reading: String,
    pub door_reading: String,
    pub light_command: String,
    pub door_command: String,
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            light_reading: topics::LIGHT_READING.to_string(),
            door_reading: topics::DOOR_READING.to_string(),
            light_command: topics::LIGHT_COMMAND.to_string(),
            door_command: topics::DOOR_COMMAND.to_string(),
        }
    }
}

/// Retry/settle/reconnect timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub max_retry: i32,
    pub settle_ms: u64,
    pub startup_step_ms: u64,
    pub first_reconnect_delay_secs: u64,
    pub reconnect_rate: u32,
    pub max_reconnect_delay_secs: u64,
    pub max_reconnect_count: u32,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            max_retry: timing::MAX_RETRY,
            settle_ms: timing::SETTLE_MS,
            startup_step_ms: timing::STARTUP_STEP_MS,
            first_reconnect_delay_secs: timing::FIRST_RECONNECT_DELAY_SECS,
            reconnect_rate: timing::RECONNECT_RATE,
            max_reconnect_delay_secs: timing::MAX_RECONNECT_DELAY_SECS,
            max_reconnect_count: timing::MAX_RECONNECT_COUNT,
        }
    }
}

impl TimingSettings {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn startup_step(&self) -> Duration {
        Duration::from_millis(self.startup_step_ms)
    }
}

/// Reasoner backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: endpoints::OLLAMA.to_string(),
            model: models::OLLAMA_DEFAULT.to_string(),
            temperature: agent::DEFAULT_TEMPERATURE,
            timeout_secs: agent::DEFAULT_LLM_TIMEOUT_SECS,
        }
    }
}

/// Dispatch loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_turns: usize,
    /// Replaces the built-in system prompt when set.
    pub system_prompt: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_turns: agent::DEFAULT_MAX_TURNS,
            system_prompt: None,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HearthConfig {
    pub mqtt: MqttSettings,
    pub topics: TopicSettings,
    pub timing: TimingSettings,
    pub llm: LlmSettings,
    pub agent: AgentSettings,
}

impl HearthConfig {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(broker) = lookup(env_vars::MQTT_BROKER) {
            self.mqtt.broker = broker;
        }
        if let Some(port) = lookup(env_vars::MQTT_PORT) {
            self.mqtt.port = port
                .parse()
                .map_err(|_| Error::config(format!("invalid {}: {}", env_vars::MQTT_PORT, port)))?;
        }
        if let Some(username) = lookup(env_vars::MQTT_USERNAME) {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = lookup(env_vars::MQTT_PASSWORD) {
            self.mqtt.password = Some(password);
        }
        if let Some(endpoint) = lookup(env_vars::OLLAMA_ENDPOINT) {
            self.llm.endpoint = normalize_ollama_endpoint(endpoint);
        }
        if let Some(model) = lookup(env_vars::LLM_MODEL) {
            self.llm.model = model;
        }
        if let Some(turns) = lookup(env_vars::AGENT_MAX_TURNS) {
            self.agent.max_turns = turns.parse().map_err(|_| {
                Error::config(format!("invalid {}: {}", env_vars::AGENT_MAX_TURNS, turns))
            })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.mqtt.broker.trim().is_empty() {
            return Err(Error::config("mqtt.broker must not be empty"));
        }
        if self.timing.max_retry < 0 {
            return Err(Error::config("timing.max_retry must not be negative"));
        }
        if self.timing.max_reconnect_count == 0 {
            return Err(Error::config("timing.max_reconnect_count must be at least 1"));
        }
        if self.agent.max_turns == 0 {
            return Err(Error::config("agent.max_turns must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_normalize_ollama_endpoint() {
        assert_eq!(
            normalize_ollama_endpoint("http://localhost:11434/v1".to_string()),
            "http://localhost:11434"
        );
        assert_eq!(
            normalize_ollama_endpoint("http://localhost:11434/".to_string()),
            "http://localhost:11434"
        );
        assert_eq!(
            normalize_ollama_endpoint("http://localhost:11434".to_string()),
            "http://localhost:11434"
        );
    }

    #[test]
    fn test_defaults() {
        let config = HearthConfig::default();
        assert_eq!(config.mqtt.broker, "test.mosquitto.org");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.timing.max_retry, 3);
        assert_eq!(config.timing.settle(), Duration::from_secs(2));
        assert_eq!(config.agent.max_turns, 100);
        assert_eq!(config.llm.model, "llama3.1:8b");
        assert_eq!(config.topics.light_command, "device/light/command");
    }

    #[test]
    fn test_partial_toml() {
        let config = HearthConfig::from_toml_str(
            r#"
            [mqtt]
            broker = "192.168.1.10"

            [topics]
            light_reading = "esp32-solomon/LED"
            light_command = "esp32-solomon/LED_CTL"
            "#,
        )
        .unwrap();

        assert_eq!(config.mqtt.broker, "192.168.1.10");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.topics.light_reading, "esp32-solomon/LED");
        assert_eq!(config.topics.door_reading, "device/door/reading");
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let err = HearthConfig::from_toml_str("[agent]\nmax_turns = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = HearthConfig::from_toml_str("[mqtt\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mqtt]\nport = 8883\n").unwrap();

        let config = HearthConfig::load(file.path()).unwrap();
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.full_broker_addr(), "test.mosquitto.org:8883");
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (env_vars::MQTT_BROKER, "broker.local"),
            (env_vars::MQTT_PORT, "1884"),
            (env_vars::OLLAMA_ENDPOINT, "http://gpu:11434/v1"),
            (env_vars::AGENT_MAX_TURNS, "12"),
        ]
        .into_iter()
        .collect();

        let mut config = HearthConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.mqtt.full_broker_addr(), "broker.local:1884");
        assert_eq!(config.llm.endpoint, "http://gpu:11434");
        assert_eq!(config.agent.max_turns, 12);
    }

    #[test]
    fn test_bad_port_override() {
        let mut config = HearthConfig::default();
        let err = config
            .apply_overrides(|k| (k == env_vars::MQTT_PORT).then(|| "abc".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("MQTT_PORT"));
    }
}
