//! Operation kinds, prompt templates, and placeholder syntax.
//!
//! Placeholders are `{name}` with `name` matching `[a-z_][a-z0-9_]*`.
//! `{{` and `}}` render as literal braces, so templates can show JSON
//! examples to the model. Any other brace is plain text.

use serde::{Deserialize, Serialize};

/// The five operations a user can run on an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Categorize,
    ExtractActions,
    Summarize,
    DraftReply,
    ChatQuery,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        Self::Categorize,
        Self::ExtractActions,
        Self::Summarize,
        Self::DraftReply,
        Self::ChatQuery,
    ];

    /// Short label for logging and URLs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Categorize => "categorize",
            Self::ExtractActions => "extract_actions",
            Self::Summarize => "summarize",
            Self::DraftReply => "draft_reply",
            Self::ChatQuery => "chat_query",
        }
    }

    /// Placeholders a saved template must contain.
    pub fn required_placeholders(&self) -> &'static [&'static str] {
        match self {
            Self::Categorize | Self::DraftReply => &["subject", "body"],
            Self::ExtractActions | Self::Summarize => &["body"],
            Self::ChatQuery => &["body", "question", "history"],
        }
    }

    /// Placeholders the composer can fill for this operation.
    pub fn supplied_placeholders(&self) -> &'static [&'static str] {
        match self {
            Self::Categorize => &[
                "subject",
                "sender",
                "body",
                "received_at",
                "existing_labels",
                "labels",
            ],
            Self::ChatQuery => &[
                "subject",
                "sender",
                "body",
                "received_at",
                "existing_labels",
                "history",
                "question",
            ],
            Self::ExtractActions | Self::Summarize | Self::DraftReply => {
                &["subject", "sender", "body", "received_at", "existing_labels"]
            }
        }
    }

    pub fn supplies(&self, placeholder: &str) -> bool {
        self.supplied_placeholders().contains(&placeholder)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "categorize" => Ok(Self::Categorize),
            "extract_actions" => Ok(Self::ExtractActions),
            "summarize" => Ok(Self::Summarize),
            "draft_reply" => Ok(Self::DraftReply),
            "chat_query" | "chat" => Ok(Self::ChatQuery),
            _ => Err(format!("Unknown operation: {}", s)),
        }
    }
}

/// The current template for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub kind: OperationKind,
    pub text: String,
    /// Bumped on every save or reset.
    pub version: u64,
}

/// A piece of template text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

/// Split template text into literal runs and placeholders.
pub fn segments(text: &str) -> Vec<Segment<'_>> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let doubled = bytes.get(i + 1) == Some(&bytes[i]);
        match bytes[i] {
            b'{' | b'}' if doubled => {
                push_literal(&mut out, &text[literal_start..i]);
                out.push(Segment::Literal(&text[i..=i]));
                i += 2;
                literal_start = i;
            }
            b'{' => match placeholder_len(&bytes[i + 1..]) {
                Some(len) => {
                    push_literal(&mut out, &text[literal_start..i]);
                    out.push(Segment::Placeholder(&text[i + 1..i + 1 + len]));
                    i += len + 2;
                    literal_start = i;
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }
    push_literal(&mut out, &text[literal_start..]);
    out
}

fn push_literal<'a>(out: &mut Vec<Segment<'a>>, s: &'a str) {
    if !s.is_empty() {
        out.push(Segment::Literal(s));
    }
}

/// Length of an identifier at the start of `rest` that is closed by `}`.
fn placeholder_len(rest: &[u8]) -> Option<usize> {
    let first = *rest.first()?;
    if !(first.is_ascii_lowercase() || first == b'_') {
        return None;
    }
    let len = rest
        .iter()
        .take_while(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || **b == b'_')
        .count();
    (rest.get(len) == Some(&b'}')).then_some(len)
}

/// Distinct placeholder names referenced by the text, in first-seen order.
pub fn placeholders(text: &str) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for segment in segments(text) {
        if let Segment::Placeholder(name) = segment
            && !names.contains(&name)
        {
            names.push(name);
        }
    }
    names
}

/// Required placeholders the text does not reference.
pub fn missing_placeholders(kind: OperationKind, text: &str) -> Vec<String> {
    let present = placeholders(text);
    kind.required_placeholders()
        .iter()
        .filter(|required| !present.contains(required))
        .map(|s| s.to_string())
        .collect()
}

/// Built-in template text for an operation.
pub fn default_template_text(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Categorize => {
            "Categorize this email into exactly one of these categories: {labels}.\n\
             Meeting emails propose or schedule a meeting or call. Task emails contain a \
             direct request that requires the user to act.\n\
             Respond with ONLY a JSON object: {{\"label\": \"<category>\", \"confidence\": <0.0-1.0>}}\n\n\
             From: {sender}\n\
             Subject: {subject}\n\
             Body: {body}"
        }
        OperationKind::ExtractActions => {
            "Extract actionable tasks from this email. Look for requests, deadlines, and \
             required actions.\n\
             Respond with ONLY a JSON object: {{\"actions\": [{{\"description\": \"...\", \
             \"due_date\": \"YYYY-MM-DD or null\", \"priority\": \"low|medium|high\"}}]}}\n\
             Use an empty list when nothing needs doing.\n\n\
             From: {sender}\n\
             Subject: {subject}\n\
             Body: {body}"
        }
        OperationKind::Summarize => {
            "Provide a concise 2-3 sentence summary of this email focusing on the main purpose \
             and key points. Highlight any required actions or decisions.\n\n\
             From: {sender}\n\
             Subject: {subject}\n\
             Body: {body}"
        }
        OperationKind::DraftReply => {
            "Draft a polite and professional reply to this email. Keep it brief (3-4 sentences \
             max), address the main points, and maintain a helpful tone. Do not make promises \
             you can't keep.\n\
             Answer in exactly this format:\n\
             Subject: <reply subject>\n\
             Body:\n\
             <reply text>\n\n\
             From: {sender}\n\
             Subject: {subject}\n\
             Body: {body}"
        }
        OperationKind::ChatQuery => {
            "You are an email assistant answering the user's questions about one email. \
             Answer in plain text, briefly.\n\n\
             Conversation so far:\n\
             {history}\n\n\
             Question: {question}\n\n\
             From: {sender}\n\
             Subject: {subject}\n\
             Body: {body}"
        }
    }
}
