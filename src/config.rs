//! Configuration types.
//!
//! Every struct has a `Default` matching the documented behaviour and a
//! `from_env()` that overrides individual fields from `INBOX_BRAIN_*`
//! variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default maximum number of body characters sent to the model.
pub const DEFAULT_BODY_MAX_CHARS: usize = 4000;

/// Label that unknown or unparseable categories collapse to.
pub const FALLBACK_LABEL: &str = "Other";

/// Closed set of category labels plus the fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    /// Build a label set. The fallback label is appended if absent; empty
    /// and duplicate (case-insensitive) labels are dropped.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for label in labels {
            let label = label.into().trim().to_string();
            if label.is_empty() || out.iter().any(|l| l.eq_ignore_ascii_case(&label)) {
                continue;
            }
            out.push(label);
        }
        if !out.iter().any(|l| l.eq_ignore_ascii_case(FALLBACK_LABEL)) {
            out.push(FALLBACK_LABEL.to_string());
        }
        Self { labels: out }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The label unknown categories map to, in the set's own spelling.
    pub fn fallback(&self) -> &str {
        self.labels
            .iter()
            .find(|l| l.eq_ignore_ascii_case(FALLBACK_LABEL))
            .map(String::as_str)
            .unwrap_or(FALLBACK_LABEL)
    }

    /// Canonical spelling of `candidate`, if it is in the set.
    pub fn canonical(&self, candidate: &str) -> Option<&str> {
        let candidate = candidate.trim();
        self.labels
            .iter()
            .find(|l| l.eq_ignore_ascii_case(candidate))
            .map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.canonical(label).is_some()
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::new(["Meeting", "Newsletter", "Task", "Personal", "Spam", "Other"])
    }
}

impl std::fmt::Display for LabelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.labels.join(", "))
    }
}

/// Settings for the prompt composer and response parser.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum `{body}` length in characters.
    pub body_max_chars: usize,
    /// Closed label set for categorization.
    pub labels: LabelSet,
    /// Confidence given to a recognized label when the model omits one.
    pub default_confidence: f32,
    /// Categories that put an email on the urgent list.
    pub urgent_labels: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            body_max_chars: DEFAULT_BODY_MAX_CHARS,
            labels: LabelSet::default(),
            default_confidence: 0.5,
            urgent_labels: vec!["Task".to_string(), "Meeting".to_string()],
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let labels = match std::env::var("INBOX_BRAIN_LABELS") {
            Ok(raw) => LabelSet::new(raw.split(',')),
            Err(_) => defaults.labels,
        };
        let default_confidence: f32 =
            env_parse("INBOX_BRAIN_DEFAULT_CONFIDENCE", defaults.default_confidence)?;
        if !(0.0..=1.0).contains(&default_confidence) {
            return Err(ConfigError::InvalidValue {
                key: "INBOX_BRAIN_DEFAULT_CONFIDENCE".into(),
                message: "must be between 0 and 1".into(),
            });
        }
        let body_max_chars = env_parse("INBOX_BRAIN_BODY_MAX_CHARS", defaults.body_max_chars)?;
        if body_max_chars == 0 {
            return Err(ConfigError::InvalidValue {
                key: "INBOX_BRAIN_BODY_MAX_CHARS".into(),
                message: "must be greater than zero".into(),
            });
        }
        let urgent_labels = match std::env::var("INBOX_BRAIN_URGENT_LABELS") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            Err(_) => defaults.urgent_labels,
        };
        Ok(Self {
            body_max_chars,
            labels,
            default_confidence,
            urgent_labels,
        })
    }
}

/// Retry and timeout policy for model calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Hard limit on a single call.
    pub call_timeout: Duration,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            call_timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    /// Worst-case time spent in calls, excluding backoff sleeps.
    pub fn max_call_time(&self) -> Duration {
        self.call_timeout * (self.max_retries + 1)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_retries: env_parse("INBOX_BRAIN_MAX_RETRIES", defaults.max_retries)?,
            call_timeout: Duration::from_secs(env_parse(
                "INBOX_BRAIN_CALL_TIMEOUT_SECS",
                defaults.call_timeout.as_secs(),
            )?),
            initial_backoff: Duration::from_millis(env_parse(
                "INBOX_BRAIN_INITIAL_BACKOFF_MS",
                defaults.initial_backoff.as_millis() as u64,
            )?),
            max_backoff: Duration::from_millis(env_parse(
                "INBOX_BRAIN_MAX_BACKOFF_MS",
                defaults.max_backoff.as_millis() as u64,
            )?),
        })
    }
}

/// Process-level settings for the binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub retry: RetryConfig,
    /// Where saved templates live. `None` keeps them in memory only.
    pub templates_path: Option<PathBuf>,
    pub http_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            retry: RetryConfig::default(),
            templates_path: Some(PathBuf::from("./data/prompts.json")),
            http_port: 8080,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let templates_path = match std::env::var("INBOX_BRAIN_TEMPLATES_PATH") {
            Ok(p) if p.is_empty() || p == "memory" => None,
            Ok(p) => Some(PathBuf::from(p)),
            Err(_) => defaults.templates_path,
        };
        Ok(Self {
            pipeline: PipelineConfig::from_env()?,
            retry: RetryConfig::from_env()?,
            templates_path,
            http_port: env_parse("INBOX_BRAIN_HTTP_PORT", defaults.http_port)?,
        })
    }
}

/// Parse an env var, falling back to `default` when unset.
fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
