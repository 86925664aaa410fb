//! Provider-agnostic completion types and the `LlmProvider` trait.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::LlmError;

/// Metadata key carrying the operation a request was composed for.
pub const OPERATION_METADATA_KEY: &str = "operation";

/// Text-in request to a provider.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Free-form hints for providers; never sent over the wire.
    pub metadata: HashMap<String, String>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Text-out response from a provider.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A language-model backend.
///
/// One call, one response. Retries and timeouts belong to the caller;
/// implementations only report whether a failure was transient through the
/// `LlmError` variant they return.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier, used in logs and error messages.
    fn model_name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}
