//! Shared types for the operation pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::inbox::{Email, EmailId};
use crate::templates::OperationKind;

// ── Requests ────────────────────────────────────────────────────────

/// One prior exchange in a chat about an email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// Operation-specific inputs supplied by the caller.
///
/// Only `ChatQuery` reads these today. The caller owns the conversation;
/// nothing here is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraContext {
    /// Prior (question, answer) pairs, oldest first.
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    /// The question being asked now.
    #[serde(default)]
    pub question: Option<String>,
}

/// A single request to run an operation on an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub email_id: EmailId,
    pub kind: OperationKind,
    pub context: ExtraContext,
}

impl OperationRequest {
    pub fn new(email_id: EmailId, kind: OperationKind) -> Self {
        Self {
            email_id,
            kind,
            context: ExtraContext::default(),
        }
    }

    /// A chat question with the caller's conversation so far.
    pub fn chat(email_id: EmailId, question: impl Into<String>, history: Vec<ChatTurn>) -> Self {
        Self {
            email_id,
            kind: OperationKind::ChatQuery,
            context: ExtraContext {
                history,
                question: Some(question.into()),
            },
        }
    }

    pub fn with_context(mut self, context: ExtraContext) -> Self {
        self.context = context;
        self
    }
}

// ── Composed prompt ─────────────────────────────────────────────────

/// Debug information about how a prompt was built. Never sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMetadata {
    /// Length of the original body in characters.
    pub body_chars: usize,
    /// Character index the body was cut at, if it was truncated.
    pub truncated_at: Option<usize>,
}

/// Final model input after template substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedPrompt {
    pub text: String,
    pub kind: OperationKind,
    pub email_id: EmailId,
    pub template_version: u64,
    pub metadata: PromptMetadata,
}

// ── Results ─────────────────────────────────────────────────────────

/// Action item priority.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    #[serde(alias = "medium")]
    Med,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Med => write!(f, "med"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "med" | "medium" | "normal" => Ok(Self::Med),
            "high" | "urgent" => Ok(Self::High),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// One actionable item found in an email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
}

/// A category from the configured label set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryResult {
    pub label: String,
    /// Always within [0, 1].
    pub confidence: f32,
}

/// A model-written reply, not yet reviewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftCandidate {
    pub subject: String,
    pub body: String,
    pub in_reply_to: EmailId,
}

/// Typed output of an operation. One variant per operation kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationResult {
    Category(CategoryResult),
    ActionList { actions: Vec<Action> },
    Summary { text: String },
    DraftCandidate(DraftCandidate),
    ChatReply { text: String },
}

impl OperationResult {
    /// The operation this result answers.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Category(_) => OperationKind::Categorize,
            Self::ActionList { .. } => OperationKind::ExtractActions,
            Self::Summary { .. } => OperationKind::Summarize,
            Self::DraftCandidate(_) => OperationKind::DraftReply,
            Self::ChatReply { .. } => OperationKind::ChatQuery,
        }
    }
}

/// Why a successful parse is only partially trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// The model's label was not in the set; fell back to the default label.
    UnknownLabel { raw: String },
    /// A known label came without a usable confidence.
    MissingConfidence,
    /// An action item was discarded.
    ActionDropped { index: usize, reason: String },
    /// An action's due date could not be read and was left empty.
    DueDateIgnored { index: usize, raw: String },
    /// No structured list was found; actions were read from bullet lines.
    UnstructuredActions,
}

/// Parser output: a typed result plus any fallbacks it needed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub result: OperationResult,
    pub degradations: Vec<Degradation>,
}

impl ParseOutcome {
    pub fn clean(result: OperationResult) -> Self {
        Self {
            result,
            degradations: Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}

/// A completed operation as stored in the result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedOperation {
    pub email_id: EmailId,
    pub kind: OperationKind,
    pub result: OperationResult,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degradations: Vec<Degradation>,
    /// Pending draft created for a `DraftReply` result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<Uuid>,
    pub template_version: u64,
    pub completed_at: DateTime<Utc>,
}

impl ProcessedOperation {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}

/// Categorize → (actions if Task) → summarize, for one email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageReport {
    pub email_id: EmailId,
    pub category: CategoryResult,
    pub actions: Vec<Action>,
    pub summary: String,
    /// Whether any step needed a fallback.
    pub degraded: bool,
}

/// Category counts over stored results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxStats {
    pub total: usize,
    pub categorized: usize,
    pub uncategorized: usize,
    pub by_label: BTreeMap<String, usize>,
    pub pending_drafts: usize,
}

// ── Inbox views ─────────────────────────────────────────────────────

/// An action item together with the email it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAction {
    pub email_id: EmailId,
    #[serde(flatten)]
    pub action: Action,
}

/// One line of an inbox listing, as shown for search hits and urgent mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDigest {
    pub email_id: EmailId,
    pub sender: String,
    pub subject: String,
    pub category: Option<String>,
    pub summary: Option<String>,
}

/// An email with every result stored for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailDetails {
    pub email: Email,
    pub results: Vec<ProcessedOperation>,
}

/// Inbox stats plus plain-language recommendations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxOverview {
    #[serde(flatten)]
    pub stats: InboxStats,
    pub urgent: usize,
    pub open_actions: usize,
    pub recommendations: Vec<String>,
}

// ── Pipeline stage ──────────────────────────────────────────────────

/// Where a request is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Composing,
    Invoking,
    Parsing,
    Done,
    Failed,
}

impl Stage {
    /// Check if this stage allows transitioning to another.
    pub fn can_transition_to(&self, target: Stage) -> bool {
        use Stage::*;

        matches!(
            (self, target),
            (Pending, Composing)
                | (Composing, Invoking)
                | (Invoking, Parsing)
                | (Parsing, Done)
                | (Pending, Failed)
                | (Composing, Failed)
                | (Invoking, Failed)
                | (Parsing, Failed)
        )
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Composing => "composing",
            Self::Invoking => "invoking",
            Self::Parsing => "parsing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}
