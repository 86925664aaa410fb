//! Error types for Inbox Brain.

use std::time::Duration;

use crate::inbox::EmailId;
use crate::pipeline::types::Stage;
use crate::templates::OperationKind;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Prompt template store errors.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("No template available for operation {kind}")]
    NotFound { kind: OperationKind },

    #[error("Template for {kind} is missing required placeholders: {}", .missing.join(", "))]
    Invalid {
        kind: OperationKind,
        missing: Vec<String>,
    },

    #[error("Template file {path} could not be used: {reason}")]
    Persistence { path: String, reason: String },
}

/// Prompt composition errors.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("Template for {kind} references {{{placeholder}}}, which this operation does not supply")]
    PlaceholderMissing {
        kind: OperationKind,
        placeholder: String,
    },
}

/// LLM provider errors, as reported by a single call.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned server error {status}: {reason}")]
    ServerError {
        provider: String,
        status: u16,
        reason: String,
    },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Provider {provider} rejected the request: {reason}")]
    BadRequest { provider: String, reason: String },

    #[error("Model {model} not available on provider {provider}")]
    ModelNotAvailable { provider: String, model: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

impl LlmError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed { .. }
                | Self::ServerError { .. }
                | Self::RateLimited { .. }
                | Self::Timeout { .. }
        )
    }

    /// Backoff hint supplied by the provider, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Model invocation errors, after the client's retry policy has run.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model unavailable after {attempts} attempt(s): {last_error}")]
    Unavailable {
        attempts: u32,
        #[source]
        last_error: LlmError,
    },
}

impl ModelError {
    /// Number of calls made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Unavailable { attempts, .. } => *attempts,
        }
    }
}

/// Model output validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Model returned an empty response for {kind}")]
    EmptyModelResponse { kind: OperationKind },

    #[error("Draft reply is missing its {missing} section")]
    IncompleteDraft { missing: &'static str },
}

/// Anything that can stop a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Email {email_id} not found")]
    EmailNotFound { email_id: EmailId },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Operation cancelled by caller")]
    Cancelled,
}

impl PipelineError {
    /// Stable machine-readable code for the UI.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmailNotFound { .. } => "email_not_found",
            Self::Template(TemplateError::NotFound { .. }) => "template_not_found",
            Self::Template(TemplateError::Invalid { .. }) => "template_invalid",
            Self::Template(TemplateError::Persistence { .. }) => "template_persistence",
            Self::Compose(ComposeError::PlaceholderMissing { .. }) => "placeholder_missing",
            Self::Model(ModelError::Unavailable { .. }) => "model_unavailable",
            Self::Parse(ParseError::EmptyModelResponse { .. }) => "empty_model_response",
            Self::Parse(ParseError::IncompleteDraft { .. }) => "incomplete_draft",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A failed operation, with enough context for the UI to explain it.
#[derive(Debug, thiserror::Error)]
#[error("{kind} on email {email_id} failed while {stage}: {error}")]
pub struct OperationFailure {
    pub email_id: EmailId,
    pub kind: OperationKind,
    /// Stage the pipeline was in when it failed.
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
}

impl OperationFailure {
    pub fn code(&self) -> &'static str {
        self.error.code()
    }
}
