//! Model client: one prompt in, raw text out, with bounded retries.
//!
//! Each call is wrapped in a hard timeout. Transient failures (timeouts,
//! transport errors, 5xx, rate limits) are retried with exponential backoff;
//! anything else gives up immediately. The total number of calls never
//! exceeds `max_retries + 1`.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, warn};

use super::provider::{
    CompletionRequest, CompletionResponse, LlmProvider, OPERATION_METADATA_KEY,
};
use crate::config::RetryConfig;
use crate::error::{LlmError, ModelError};
use crate::pipeline::types::ComposedPrompt;

/// Sampling temperature for pipeline calls. Low, since parsers want
/// predictable shapes.
const TEMPERATURE: f32 = 0.1;

/// Output cap per call. Drafts are the longest expected answer.
const MAX_OUTPUT_TOKENS: u32 = 1024;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    RetryAfter(Duration),
    GiveUp,
}

/// Attempt counter and backoff schedule for one invocation.
#[derive(Debug)]
struct RetryState {
    attempt: u32,
    max_attempts: u32,
    next_delay: Duration,
    max_delay: Duration,
}

impl RetryState {
    fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            max_attempts: config.max_retries.saturating_add(1),
            next_delay: config.initial_backoff,
            max_delay: config.max_backoff,
        }
    }

    /// Record the start of an attempt.
    fn begin(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Decide what follows a failure of the current attempt.
    fn on_failure(&mut self, err: &LlmError) -> Next {
        if !err.is_transient() || self.attempt >= self.max_attempts {
            return Next::GiveUp;
        }
        let base = self.next_delay;
        self.next_delay = (self.next_delay * 2).min(self.max_delay);

        let delay = match err.retry_after() {
            Some(hint) => hint.max(base),
            None => base + jitter(base),
        };
        Next::RetryAfter(delay.min(self.max_delay))
    }
}

/// Up to 10% of `base`, so concurrent callers do not retry in lockstep.
fn jitter(base: Duration) -> Duration {
    let max_ms = (base.as_millis() / 10) as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// Sends composed prompts to a provider under the retry policy.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn LlmProvider>,
    retry: RetryConfig,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn LlmProvider>, retry: RetryConfig) -> Self {
        Self { provider, retry }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Invoke the model and return its raw text.
    ///
    /// Fails with `ModelError::Unavailable` once the retry budget is spent
    /// or on the first non-transient failure.
    pub async fn invoke(&self, prompt: &ComposedPrompt) -> Result<String, ModelError> {
        let request = CompletionRequest::new(prompt.text.clone())
            .with_max_tokens(MAX_OUTPUT_TOKENS)
            .with_temperature(TEMPERATURE)
            .with_metadata(OPERATION_METADATA_KEY, prompt.kind.to_string());

        let mut state = RetryState::new(&self.retry);
        loop {
            let attempt = state.begin();
            let err = match self.call_once(request.clone()).await {
                Ok(response) => {
                    debug!(
                        email_id = %prompt.email_id,
                        operation = %prompt.kind,
                        attempt,
                        input_tokens = response.input_tokens,
                        output_tokens = response.output_tokens,
                        chars = response.content.len(),
                        "Model call succeeded"
                    );
                    return Ok(response.content);
                }
                Err(e) => e,
            };

            match state.on_failure(&err) {
                Next::RetryAfter(delay) => {
                    warn!(
                        email_id = %prompt.email_id,
                        operation = %prompt.kind,
                        attempt,
                        max_attempts = state.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Next::GiveUp => {
                    error!(
                        email_id = %prompt.email_id,
                        operation = %prompt.kind,
                        attempts = attempt,
                        transient = err.is_transient(),
                        error = %err,
                        "Model unavailable"
                    );
                    return Err(ModelError::Unavailable {
                        attempts: attempt,
                        last_error: err,
                    });
                }
            }
        }
    }

    async fn call_once(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let timeout = self.retry.call_timeout;
        tokio::time::timeout(timeout, self.provider.complete(request))
            .await
            .unwrap_or_else(|_| {
                Err(LlmError::Timeout {
                    provider: self.provider.model_name().to_string(),
                    timeout,
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::inbox::EmailId;
    use crate::pipeline::types::PromptMetadata;
    use crate::templates::OperationKind;

    fn prompt() -> ComposedPrompt {
        ComposedPrompt {
            text: "Summarize: hello".into(),
            kind: OperationKind::Summarize,
            email_id: EmailId(1),
            template_version: 1,
            metadata: PromptMetadata {
                body_chars: 5,
                truncated_at: None,
            },
        }
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            call_timeout: Duration::from_millis(20),
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    fn ok(content: &str) -> CompletionResponse {
        CompletionResponse {
            content: content.into(),
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    /// Never answers within any reasonable timeout.
    struct HangingProvider {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmProvider for HangingProvider {
        fn model_name(&self) -> &str {
            "hanging"
        }

        async fn complete(&self, _: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ok("too late"))
        }
    }

    /// Plays back a fixed script of outcomes.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<CompletionResponse, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ok("default")))
        }
    }

    fn server_error() -> LlmError {
        LlmError::ServerError {
            provider: "scripted".into(),
            status: 503,
            reason: "overloaded".into(),
        }
    }

    #[tokio::test]
    async fn timeouts_exhaust_retry_budget() {
        let provider = Arc::new(HangingProvider {
            calls: AtomicU32::new(0),
        });
        let client = ModelClient::new(provider.clone(), fast_retry(2));

        let err = client.invoke(&prompt()).await.unwrap_err();
        assert_eq!(err.attempts(), 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        let ModelError::Unavailable { last_error, .. } = err;
        assert!(matches!(last_error, LlmError::Timeout { .. }));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(server_error()),
            Err(server_error()),
            Ok(ok("finally")),
        ]));
        let client = ModelClient::new(provider.clone(), fast_retry(2));

        let text = client.invoke(&prompt()).await.unwrap();
        assert_eq!(text, "finally");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(LlmError::AuthFailed {
            provider: "scripted".into(),
        })]));
        let client = ModelClient::new(provider.clone(), fast_retry(2));

        let err = client.invoke(&prompt()).await.unwrap_err();
        assert_eq!(err.attempts(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(server_error())]));
        let client = ModelClient::new(provider.clone(), fast_retry(0));

        let err = client.invoke(&prompt()).await.unwrap_err();
        assert_eq!(err.attempts(), 1);
    }

    #[tokio::test]
    async fn rate_limit_is_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(LlmError::RateLimited {
                provider: "scripted".into(),
                retry_after: Some(Duration::from_millis(2)),
            }),
            Ok(ok("after wait")),
        ]));
        let client = ModelClient::new(provider.clone(), fast_retry(1));

        assert_eq!(client.invoke(&prompt()).await.unwrap(), "after wait");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = RetryConfig {
            max_retries: 5,
            call_timeout: Duration::from_secs(1),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
        };
        let mut state = RetryState::new(&config);
        let err = server_error();

        let mut delays = Vec::new();
        for _ in 0..4 {
            state.begin();
            match state.on_failure(&err) {
                Next::RetryAfter(d) => delays.push(d),
                Next::GiveUp => panic!("gave up early"),
            }
        }
        assert!(delays[0] >= Duration::from_millis(100) && delays[0] <= Duration::from_millis(110));
        assert!(delays[1] >= Duration::from_millis(200) && delays[1] <= Duration::from_millis(220));
        assert!(delays[2] <= Duration::from_millis(300));
        assert!(delays[3] <= Duration::from_millis(300));
    }

    #[test]
    fn retry_after_hint_is_capped() {
        let config = RetryConfig {
            max_retries: 1,
            call_timeout: Duration::from_secs(1),
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
        };
        let mut state = RetryState::new(&config);
        state.begin();
        let err = LlmError::RateLimited {
            provider: "p".into(),
            retry_after: Some(Duration::from_secs(120)),
        };
        assert_eq!(
            state.on_failure(&err),
            Next::RetryAfter(Duration::from_millis(50))
        );
        state.begin();
        assert_eq!(state.on_failure(&err), Next::GiveUp);
    }
}
