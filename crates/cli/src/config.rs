//! Configuration loading from toolbridge.toml.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use mcp::{ServerConfig, Timeouts};
use runtime::{AgentConfig, AnthropicBackend, ExtraArguments, OpenAiBackend, Provider};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Tool server to spawn.
    #[serde(default)]
    pub server: ServerSettings,

    /// Model provider.
    #[serde(default)]
    pub backend: BackendSettings,

    /// Loop limits and prompt.
    #[serde(default)]
    pub agent: AgentSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Name used in logs.
    pub name: String,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: "tools".to_string(),
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Any OpenAI Chat Completions compatible endpoint.
    #[default]
    OpenAi,
    Anthropic,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub provider: ProviderKind,
    pub model: String,
    /// API root; the provider's public endpoint when unset.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: "qwen-plus".to_string(),
            base_url: None,
            api_key: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub step_budget: usize,
    pub request_timeout_secs: u64,
    pub startup_timeout_secs: u64,
    /// Reject undeclared tool arguments instead of dropping them.
    pub strict_extra_args: bool,
    pub system_prompt: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            step_budget: runtime::agent::DEFAULT_STEP_BUDGET,
            request_timeout_secs: runtime::agent::DEFAULT_REQUEST_TIMEOUT.as_secs(),
            startup_timeout_secs: mcp::DEFAULT_STARTUP_TIMEOUT.as_secs(),
            strict_extra_args: false,
            system_prompt: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// How to launch the tool server.
    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        let command = self
            .server
            .command
            .clone()
            .ok_or(ConfigError::MissingServerCommand)?;

        Ok(ServerConfig {
            name: self.server.name.clone(),
            command,
            args: self.server.args.clone(),
            env: self.server.env.clone(),
            timeouts: Timeouts {
                startup: Duration::from_secs(self.agent.startup_timeout_secs),
                request: Duration::from_secs(self.agent.request_timeout_secs),
            },
        })
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            step_budget: self.agent.step_budget,
            request_timeout: Duration::from_secs(self.agent.request_timeout_secs),
            extra_arguments: if self.agent.strict_extra_args {
                ExtraArguments::Reject
            } else {
                ExtraArguments::Ignore
            },
            system_prompt: self.agent.system_prompt.clone(),
        }
    }

    /// Build the configured model backend.
    pub fn backend(&self) -> Result<Provider, ConfigError> {
        let settings = &self.backend;
        let api_key = settings
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let provider = match settings.provider {
            ProviderKind::OpenAi => {
                let mut builder = OpenAiBackend::builder(api_key, &settings.model);
                if let Some(url) = &settings.base_url {
                    builder = builder.base_url(url);
                }
                if let Some(temperature) = settings.temperature {
                    builder = builder.temperature(temperature);
                }
                if let Some(max_tokens) = settings.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }
                builder.build().into()
            }
            ProviderKind::Anthropic => {
                let mut builder = AnthropicBackend::builder(api_key, &settings.model);
                if let Some(url) = &settings.base_url {
                    builder = builder.base_url(url);
                }
                if let Some(temperature) = settings.temperature {
                    builder = builder.temperature(temperature);
                }
                if let Some(max_tokens) = settings.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }
                builder.build().into()
            }
        };

        Ok(provider)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("no tool server configured: set server.command")]
    MissingServerCommand,

    #[error("no API key configured: set backend.api_key or TOOLBRIDGE_API_KEY")]
    MissingApiKey,
}
