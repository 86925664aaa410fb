//! Offline keyword-matching provider.
//!
//! Lets the assistant run with no API key. It reads the operation from the
//! request metadata (falling back to sniffing the prompt), pulls the email
//! back out of the prompt's `From:` / `Subject:` / `Body:` lines, and answers
//! in the formats the response parser accepts. Accuracy is whatever a
//! handful of keyword lists can manage.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use regex::Regex;
use serde_json::json;

use super::provider::{
    CompletionRequest, CompletionResponse, LlmProvider, OPERATION_METADATA_KEY,
};
use crate::error::LlmError;
use crate::templates::OperationKind;

static PLEASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bplease\s+([^.!?]+[.!?]?)").expect("valid regex"));
static NEED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:need to|should|must)\s+([^.!?]+[.!?]?)").expect("valid regex")
});
static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)body:").expect("valid regex"));
static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*[-*•]\s*(.+)$").expect("valid regex"));

/// (label, keywords) in tie-break order.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Spam",
        &["promotion", "special offer", "discount", "buy now", "limited time", "click here"],
    ),
    (
        "Meeting",
        &["meet", "call", "schedule", "calendar", "sync", "available", "agenda"],
    ),
    (
        "Newsletter",
        &["newsletter", "digest", "this week in", "unsubscribe", "subscription"],
    ),
    (
        "Task",
        &["please", "need to", "action required", "deadline", "must", "required", "reminder"],
    ),
    (
        "Personal",
        &["family", "birthday", "dinner", "weekend", "vacation", "congrat"],
    ),
];

const URGENT_WORDS: &[&str] = &["urgent", "asap", "immediately", "critical"];
const RELAXED_WORDS: &[&str] = &["when possible", "at your convenience", "no rush"];

/// Email fields recovered from a composed prompt.
#[derive(Debug, Default)]
struct PromptEmail {
    sender: String,
    subject: String,
    body: String,
    question: String,
}

/// Provider that answers from keyword heuristics instead of a model.
pub struct HeuristicProvider {
    name: String,
}

impl HeuristicProvider {
    pub fn new() -> Self {
        Self {
            name: "heuristic".to_string(),
        }
    }

    fn respond(&self, request: &CompletionRequest) -> String {
        let prompt = request.prompt.as_str();
        let kind = request
            .metadata
            .get(OPERATION_METADATA_KEY)
            .and_then(|k| k.parse::<OperationKind>().ok())
            .unwrap_or_else(|| sniff_operation(prompt));
        let email = extract_email(prompt);

        match kind {
            OperationKind::Categorize => categorize(&email),
            OperationKind::ExtractActions => extract_actions(&email, Utc::now().date_naive()),
            OperationKind::Summarize => summarize(&email),
            OperationKind::DraftReply => draft_reply(&email),
            OperationKind::ChatQuery => answer(&email),
        }
    }
}

impl Default for HeuristicProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for HeuristicProvider {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let content = self.respond(&request);
        Ok(CompletionResponse {
            input_tokens: 0,
            output_tokens: 0,
            content,
        })
    }
}

fn sniff_operation(prompt: &str) -> OperationKind {
    let lower = prompt.to_lowercase();
    if lower.contains("categor") {
        OperationKind::Categorize
    } else if lower.contains("extract") && lower.contains("action") {
        OperationKind::ExtractActions
    } else if lower.contains("summar") {
        OperationKind::Summarize
    } else if lower.contains("reply") || lower.contains("draft") {
        OperationKind::DraftReply
    } else {
        OperationKind::ChatQuery
    }
}

/// Value of the last `label:` line in `text`, case-insensitive.
fn last_field<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    text.lines().rev().find_map(|line| {
        let trimmed = line.trim_start();
        let head = trimmed.get(..label.len())?;
        if head.eq_ignore_ascii_case(label) && trimmed[label.len()..].starts_with(':') {
            Some(trimmed[label.len() + 1..].trim())
        } else {
            None
        }
    })
}

fn extract_email(prompt: &str) -> PromptEmail {
    let body = match BODY_RE.find_iter(prompt).last() {
        Some(m) => {
            let rest = prompt[m.end()..].trim_start();
            rest.split("\n\n").next().unwrap_or(rest).trim().to_string()
        }
        None => prompt.trim().to_string(),
    };
    PromptEmail {
        sender: last_field(prompt, "from").unwrap_or_default().to_string(),
        subject: last_field(prompt, "subject").unwrap_or_default().to_string(),
        body,
        question: last_field(prompt, "question").unwrap_or_default().to_string(),
    }
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

fn categorize(email: &PromptEmail) -> String {
    let text = format!("{} {}", email.subject, email.body).to_lowercase();

    let mut best: Option<(&str, usize)> = None;
    for &(label, words) in CATEGORY_KEYWORDS {
        let hits = words.iter().filter(|w| text.contains(*w)).count();
        if hits > 0 && best.is_none_or(|(_, top)| hits > top) {
            best = Some((label, hits));
        }
    }

    let (label, confidence) = match best {
        Some((label, hits)) => (label, (0.55 + 0.15 * hits as f64).min(0.95)),
        None => ("Other", 0.3),
    };
    json!({ "label": label, "confidence": confidence }).to_string()
}

fn priority(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if contains_any(&lower, URGENT_WORDS) {
        "high"
    } else if contains_any(&lower, RELAXED_WORDS) {
        "low"
    } else {
        "medium"
    }
}

/// Resolve relative deadlines ("tomorrow", "by Friday") against `today`.
fn deadline(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lower = text.to_lowercase();
    if lower.contains("tomorrow") {
        return Some(today + Duration::days(1));
    }
    if lower.contains("today") || lower.contains("eod") || lower.contains("end of day") {
        return Some(today);
    }
    let weekdays = [
        ("monday", Weekday::Mon),
        ("tuesday", Weekday::Tue),
        ("wednesday", Weekday::Wed),
        ("thursday", Weekday::Thu),
        ("friday", Weekday::Fri),
        ("saturday", Weekday::Sat),
        ("sunday", Weekday::Sun),
    ];
    weekdays.iter().find(|(name, _)| lower.contains(name)).map(|(_, day)| {
        let ahead = (day.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7;
        today + Duration::days(if ahead == 0 { 7 } else { ahead as i64 })
    })
}

fn clean_task(text: &str) -> String {
    let text = text.trim();
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn extract_actions(email: &PromptEmail, today: NaiveDate) -> String {
    let body = &email.body;
    let due = deadline(body, today).map(|d| d.format("%Y-%m-%d").to_string());
    let mut actions = Vec::new();

    for re in [&*PLEASE_RE, &*NEED_RE, &*BULLET_RE] {
        for caps in re.captures_iter(body) {
            let description = clean_task(&caps[1]);
            if description.is_empty() {
                continue;
            }
            actions.push(json!({
                "description": description,
                "due_date": due,
                "priority": priority(body),
            }));
        }
    }
    actions.truncate(3);

    json!({ "actions": actions }).to_string()
}

fn summarize(email: &PromptEmail) -> String {
    let body = email.body.to_lowercase();
    let mut themes = Vec::new();
    if contains_any(&body, &["meeting", "call", "discuss", "schedule"]) {
        themes.push("scheduling or discussion");
    }
    if contains_any(&body, &["report", "document", "review", "submit"]) {
        themes.push("document review or submission");
    }
    if contains_any(&body, &["project", "task", "assignment", "work"]) {
        themes.push("project work or tasks");
    }
    if contains_any(&body, &["question", "query", "advice", "help"]) {
        themes.push("questions or advice needed");
    }

    let mut summary = if themes.is_empty() {
        format!("This email '{}' requires your attention. ", email.subject)
    } else {
        format!(
            "This email about '{}' involves {}. ",
            email.subject,
            themes.join(", ")
        )
    };
    if contains_any(&body, URGENT_WORDS) {
        summary.push_str("It appears to be time-sensitive and should be addressed promptly.");
    } else {
        summary.push_str("Please review it when you have time.");
    }
    summary
}

fn reply_text(body: &str) -> &'static str {
    let body = body.to_lowercase();
    if contains_any(&body, &["meeting", "schedule", "call"]) {
        "Thank you for reaching out about scheduling.\n\n\
         I'd be happy to connect. Please let me know what times work best for you next week.\n\n\
         Looking forward to our discussion."
    } else if contains_any(&body, &["question", "help", "advice"]) {
        "Thank you for your question.\n\n\
         I'll look into this and get back to you with more information shortly.\n\n\
         Best regards"
    } else if contains_any(&body, &["urgent", "asap", "immediately"]) {
        "Thank you for your urgent message.\n\n\
         I've received this and will prioritize reviewing it. I'll follow up with you soon.\n\n\
         Best regards"
    } else {
        "Thank you for your email.\n\n\
         I have received your message and will review it shortly. I'll get back to you with a \
         proper response.\n\n\
         Best regards"
    }
}

fn draft_reply(email: &PromptEmail) -> String {
    let subject = if email.subject.to_lowercase().starts_with("re:") {
        email.subject.clone()
    } else if email.subject.is_empty() {
        "Re: your message".to_string()
    } else {
        format!("Re: {}", email.subject)
    };
    format!("Subject: {}\nBody:\n{}", subject, reply_text(&email.body))
}

fn answer(email: &PromptEmail) -> String {
    let question = email.question.to_lowercase();
    if contains_any(&question, &["summar", "about", "what is"]) {
        summarize(email)
    } else if contains_any(&question, &["task", "action", "todo", "to-do", "do i need"]) {
        let mut tasks: Vec<String> = PLEASE_RE
            .captures_iter(&email.body)
            .chain(NEED_RE.captures_iter(&email.body))
            .map(|c| clean_task(&c[1]))
            .filter(|t| !t.is_empty())
            .collect();
        tasks.truncate(3);
        if tasks.is_empty() {
            "I couldn't find any explicit tasks in this email.".to_string()
        } else {
            format!("Here is what the email asks of you: {}", tasks.join(" "))
        }
    } else if contains_any(&question, &["reply", "respond", "draft"]) {
        format!(
            "A reply could look like this:\n\n{}",
            reply_text(&email.body)
        )
    } else if contains_any(&question, &["who", "sender", "from"]) {
        format!("This email was sent by {}.", email.sender)
    } else {
        format!(
            "This email from {} is about '{}'. Ask me to summarize it, list its tasks, or draft a reply.",
            email.sender, email.subject
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(subject: &str, body: &str) -> String {
        format!("Do the thing.\nSubject: <reply subject>\n\nFrom: a@x.com\nSubject: {subject}\nBody: {body}")
    }

    fn request(kind: OperationKind, text: String) -> CompletionRequest {
        CompletionRequest::new(text)
            .with_metadata(OPERATION_METADATA_KEY, kind.label())
    }

    #[test]
    fn extracts_last_subject_line() {
        let email = extract_email(&prompt("Real subject", "Hello there"));
        assert_eq!(email.subject, "Real subject");
        assert_eq!(email.sender, "a@x.com");
        assert_eq!(email.body, "Hello there");
    }

    #[test]
    fn categorizes_meeting_request() {
        let provider = HeuristicProvider::new();
        let out = provider.respond(&request(
            OperationKind::Categorize,
            prompt(
                "Q3 Budget Sync",
                "Can we meet Tuesday 3pm to review Q3 numbers?",
            ),
        ));
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["label"], "Meeting");
        assert!(value["confidence"].as_f64().unwrap() > 0.5);
    }

    #[test]
    fn categorizes_newsletter_and_other() {
        let newsletter = categorize(&extract_email(&prompt(
            "Weekly Tech Digest",
            "This week in AI: new models.",
        )));
        assert!(newsletter.contains("Newsletter"));

        let other = categorize(&extract_email(&prompt("Hi", "Lorem ipsum.")));
        assert!(other.contains("Other"));
    }

    #[test]
    fn relative_deadlines_resolve() {
        let monday = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(
            deadline("by tomorrow", monday),
            NaiveDate::from_ymd_opt(2024, 1, 16)
        );
        assert_eq!(
            deadline("ends this Friday", monday),
            NaiveDate::from_ymd_opt(2024, 1, 19)
        );
        assert_eq!(
            deadline("see you monday", monday),
            NaiveDate::from_ymd_opt(2024, 1, 22)
        );
        assert_eq!(deadline("no dates here", monday), None);
    }

    #[test]
    fn extracts_please_requests_as_json() {
        let monday = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let email = extract_email(&prompt(
            "Update",
            "We need to review the deliverables by tomorrow. Please prepare your status reports.",
        ));
        let out = extract_actions(&email, monday);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        let actions = value["actions"].as_array().unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0]["description"], "Prepare your status reports.");
        assert_eq!(actions[0]["due_date"], "2024-01-16");
    }

    #[test]
    fn no_requests_yield_empty_list() {
        let email = extract_email(&prompt("Report", "System generated report. No action needed."));
        let out = extract_actions(&email, Utc::now().date_naive());
        assert_eq!(out, r#"{"actions":[]}"#);
    }

    #[test]
    fn draft_reply_has_subject_and_body() {
        let out = draft_reply(&extract_email(&prompt(
            "Meeting Request",
            "Could we schedule a call?",
        )));
        assert!(out.starts_with("Subject: Re: Meeting Request\nBody:\n"));
        assert!(out.contains("scheduling"));
    }

    #[test]
    fn sniffs_operation_without_metadata() {
        assert_eq!(
            sniff_operation("Please categorize this"),
            OperationKind::Categorize
        );
        assert_eq!(
            sniff_operation("Extract the action items"),
            OperationKind::ExtractActions
        );
        assert_eq!(sniff_operation("anything else"), OperationKind::ChatQuery);
    }

    #[test]
    fn chat_answers_sender_question() {
        let text = "Question: who sent this?\n\nFrom: boss@x.com\nSubject: Hi\nBody: hello";
        let email = extract_email(text);
        assert_eq!(answer(&email), "This email was sent by boss@x.com.");
    }

    #[tokio::test]
    async fn complete_never_fails() {
        let provider = HeuristicProvider::new();
        let response = provider
            .complete(CompletionRequest::new(""))
            .await
            .unwrap();
        assert!(!response.content.is_empty());
        assert_eq!(provider.model_name(), "heuristic");
    }
}
