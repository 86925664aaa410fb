//! Prompt composition: template + email + caller context → model input.

use crate::config::PipelineConfig;
use crate::error::ComposeError;
use crate::inbox::Email;
use crate::pipeline::types::{ChatTurn, ComposedPrompt, ExtraContext, PromptMetadata};
use crate::templates::{PromptTemplate, Segment};
use crate::templates::model::segments;

/// Rendered in place of `{history}` when there is no prior conversation.
const EMPTY_HISTORY: &str = "(no previous questions)";

/// Rendered in place of `{existing_labels}` for unlabeled emails.
const NO_LABELS: &str = "none";

/// Fills templates. Pure; holds only configuration.
#[derive(Debug, Clone)]
pub struct Composer {
    config: PipelineConfig,
}

impl Composer {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Substitute every placeholder in `template` and return the prompt.
    ///
    /// Fails if the template names a placeholder the operation does not
    /// supply, or if a chat template is composed without a question.
    pub fn compose(
        &self,
        template: &PromptTemplate,
        email: &Email,
        context: &ExtraContext,
    ) -> Result<ComposedPrompt, ComposeError> {
        let kind = template.kind;
        let (body, metadata) = truncate_body(&email.body, self.config.body_max_chars);

        let mut text = String::with_capacity(template.text.len() + body.len());
        for segment in segments(&template.text) {
            let name = match segment {
                Segment::Literal(s) => {
                    text.push_str(s);
                    continue;
                }
                Segment::Placeholder(name) => name,
            };
            let missing = || ComposeError::PlaceholderMissing {
                kind,
                placeholder: name.to_string(),
            };
            if !kind.supplies(name) {
                return Err(missing());
            }
            match name {
                "subject" => text.push_str(&email.subject),
                "sender" => text.push_str(&email.sender),
                "body" => text.push_str(body),
                "received_at" => {
                    text.push_str(&email.received_at.format("%Y-%m-%d %H:%M").to_string())
                }
                "existing_labels" => text.push_str(&render_labels(email)),
                "labels" => text.push_str(&self.config.labels.to_string()),
                "history" => text.push_str(&render_history(&context.history)),
                "question" => {
                    let question = context
                        .question
                        .as_deref()
                        .map(str::trim)
                        .filter(|q| !q.is_empty())
                        .ok_or_else(missing)?;
                    text.push_str(question);
                }
                _ => return Err(missing()),
            }
        }

        Ok(ComposedPrompt {
            text,
            kind,
            email_id: email.id,
            template_version: template.version,
            metadata,
        })
    }
}

/// Cut `body` to at most `max_chars` characters, on a char boundary.
fn truncate_body(body: &str, max_chars: usize) -> (&str, PromptMetadata) {
    let body_chars = body.chars().count();
    if body_chars <= max_chars {
        return (
            body,
            PromptMetadata {
                body_chars,
                truncated_at: None,
            },
        );
    }
    let cut = body
        .char_indices()
        .nth(max_chars)
        .map_or(body.len(), |(idx, _)| idx);
    (
        &body[..cut],
        PromptMetadata {
            body_chars,
            truncated_at: Some(max_chars),
        },
    )
}

fn render_labels(email: &Email) -> String {
    if email.existing_labels.is_empty() {
        return NO_LABELS.to_string();
    }
    email
        .existing_labels
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_history(history: &[ChatTurn]) -> String {
    if history.is_empty() {
        return EMPTY_HISTORY.to_string();
    }
    history
        .iter()
        .map(|turn| format!("Q: {}\nA: {}", turn.question.trim(), turn.answer.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
