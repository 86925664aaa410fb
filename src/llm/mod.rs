//! LLM integration for Inbox Brain.
//!
//! Supports:
//! - **Heuristic**: offline keyword rules, no network (the default)
//! - **OpenAI**: direct API access via rig-core
//! - **Anthropic**: direct API access via rig-core
//!
//! Hosted models go through `RigAdapter`; the `ModelClient` adds timeouts
//! and retries on top of any `LlmProvider`.

pub mod client;
pub mod heuristic;
pub mod provider;
mod rig_adapter;

pub use client::ModelClient;
pub use heuristic::HeuristicProvider;
pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Heuristic,
    OpenAi,
    Anthropic,
}

impl std::str::FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heuristic" | "mock" | "offline" => Ok(Self::Heuristic),
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(ConfigError::InvalidValue {
                key: "INBOX_BRAIN_LLM_BACKEND".into(),
                message: format!(
                    "unknown backend '{other}' (expected heuristic, openai or anthropic)"
                ),
            }),
        }
    }
}

impl LlmBackend {
    fn default_model(&self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-haiku-latest",
        }
    }

    fn api_key_var(&self) -> Option<&'static str> {
        match self {
            Self::Heuristic => None,
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: Option<SecretString>,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Heuristic,
            api_key: None,
            model: LlmBackend::Heuristic.default_model().to_string(),
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend: LlmBackend = match std::env::var("INBOX_BRAIN_LLM_BACKEND") {
            Ok(raw) => raw.parse()?,
            // No explicit backend: use whichever hosted key is present.
            Err(_) => [LlmBackend::Anthropic, LlmBackend::OpenAi]
                .into_iter()
                .find(|b| {
                    b.api_key_var()
                        .and_then(|var| std::env::var(var).ok())
                        .is_some_and(|k| !k.is_empty())
                })
                .unwrap_or(LlmBackend::Heuristic),
        };
        let api_key = backend
            .api_key_var()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty())
            .map(SecretString::from);
        let model = std::env::var("INBOX_BRAIN_MODEL")
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| backend.default_model().to_string());

        Ok(Self {
            backend,
            api_key,
            model,
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    if config.backend == LlmBackend::Heuristic {
        tracing::info!("Using heuristic provider (no model calls)");
        return Ok(Arc::new(HeuristicProvider::new()));
    }

    let key_var = config.backend.api_key_var().unwrap_or("API_KEY");
    let api_key = config
        .api_key
        .as_ref()
        .ok_or_else(|| ConfigError::MissingRequired {
            key: key_var.to_string(),
            hint: "Set it, or use INBOX_BRAIN_LLM_BACKEND=heuristic to run offline.".into(),
        })?;

    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(api_key, &config.model),
        LlmBackend::OpenAi => create_openai_provider(api_key, &config.model),
        LlmBackend::Heuristic => Ok(Arc::new(HeuristicProvider::new())),
    }
}

fn create_anthropic_provider(
    api_key: &SecretString,
    model: &str,
) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(api_key.expose_secret()).map_err(|e| {
            ConfigError::InvalidValue {
                key: "ANTHROPIC_API_KEY".to_string(),
                message: format!("Failed to create Anthropic client: {e}"),
            }
        })?;

    tracing::info!(model = %model, "Using Anthropic");
    Ok(Arc::new(RigAdapter::new(
        client.completion_model(model),
        model,
        "anthropic",
    )))
}

fn create_openai_provider(
    api_key: &SecretString,
    model: &str,
) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(api_key.expose_secret()).map_err(|e| ConfigError::InvalidValue {
            key: "OPENAI_API_KEY".to_string(),
            message: format!("Failed to create OpenAI client: {e}"),
        })?;

    tracing::info!(model = %model, "Using OpenAI");
    Ok(Arc::new(RigAdapter::new(
        client.completion_model(model),
        model,
        "openai",
    )))
}
