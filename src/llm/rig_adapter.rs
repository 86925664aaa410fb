//! Bridges rig's `CompletionModel` to our `LlmProvider` trait.
//!
//! rig handles the wire format for each hosted API. This adapter turns a
//! `CompletionRequest` into a rig completion request and sorts rig's errors
//! into `LlmError` variants, so the model client knows what to retry.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use rig::completion::{AssistantContent, CompletionModel, Message};

use super::provider::{CompletionRequest, CompletionResponse, LlmProvider};
use crate::error::LlmError;

/// Anthropic rejects requests without `max_tokens`.
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// First HTTP status code mentioned in an error message.
static STATUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([45]\d\d)\b").expect("valid regex"));

/// `LlmProvider` over any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: &'static str,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str, provider: &'static str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider,
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let mut builder = self
            .model
            .completion_request(Message::user(request.prompt))
            .max_tokens(u64::from(max_tokens));
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_failure(self.provider, &self.model_name, &e.to_string()))?;

        let content = response
            .choice
            .iter()
            .filter_map(|part| match part {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");
        if content.is_empty() {
            tracing::debug!(provider = self.provider, "Model returned no text content");
        }

        Ok(CompletionResponse {
            content,
            input_tokens: u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX),
            output_tokens: u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX),
        })
    }
}

/// Map a rig error message onto an `LlmError`.
///
/// rig folds HTTP failures into provider error strings, so the status code
/// (when present) is read back out of the message.
fn classify_failure(provider: &str, model: &str, message: &str) -> LlmError {
    let provider = provider.to_string();
    let lower = message.to_ascii_lowercase();
    let status = STATUS_RE
        .captures(message)
        .and_then(|c| c[1].parse::<u16>().ok());

    match status {
        Some(401 | 403) => LlmError::AuthFailed { provider },
        Some(429) => LlmError::RateLimited {
            provider,
            retry_after: None,
        },
        Some(404) if lower.contains("model") => LlmError::ModelNotAvailable {
            provider,
            model: model.to_string(),
        },
        Some(status @ 500..=599) => LlmError::ServerError {
            provider,
            status,
            reason: message.to_string(),
        },
        Some(_) => LlmError::BadRequest {
            provider,
            reason: message.to_string(),
        },
        None if lower.contains("rate limit") || lower.contains("rate_limit") => {
            LlmError::RateLimited {
                provider,
                retry_after: None,
            }
        }
        None if lower.contains("authentication") || lower.contains("api key") => {
            LlmError::AuthFailed { provider }
        }
        None if lower.contains("overloaded") => LlmError::ServerError {
            provider,
            status: 529,
            reason: message.to_string(),
        },
        None => LlmError::RequestFailed {
            provider,
            reason: message.to_string(),
        },
    }
}
