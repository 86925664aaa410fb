//! Turns raw model text into typed operation results.
//!
//! Models do not reliably follow output instructions, so every operation
//! accepts a JSON shape (bare, fenced, or wrapped in prose) and a plain-text
//! shape. Anything recovered through a fallback is reported as a
//! `Degradation` rather than an error; only output with nothing usable in it
//! fails.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde_json::{Map, Value};

use crate::config::PipelineConfig;
use crate::error::ParseError;
use crate::inbox::EmailId;
use crate::pipeline::types::{
    Action, CategoryResult, Degradation, DraftCandidate, OperationResult, ParseOutcome, Priority,
};
use crate::templates::OperationKind;

static CATEGORY_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:category|label)\s*[:=]\s*(.+?)\s*$").expect("valid regex")
});

static CONFIDENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)confidence\s*[:=]?\s*([0-9]*\.?[0-9]+)\s*(%)?").expect("valid regex")
});

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)\s*%").expect("valid regex"));

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+?)\s*$").expect("valid regex"));

static SUBJECT_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*subject\s*:[ \t]*(.*?)\s*$").expect("valid regex"));

static BODY_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*body\s*:[ \t]*").expect("valid regex"));

const DESCRIPTION_KEYS: &[&str] = &["description", "task", "title", "action"];
const DUE_KEYS: &[&str] = &["due_date", "deadline", "due"];
const ACTION_LIST_KEYS: &[&str] = &["actions", "tasks", "action_items", "items"];
const LABEL_KEYS: &[&str] = &["label", "category"];
const SUMMARY_KEYS: &[&str] = &["summary", "text"];
const ANSWER_KEYS: &[&str] = &["answer", "reply", "text"];
const DRAFT_KEYS: &[&str] = &["subject", "body", "reply", "text"];

/// Due-date values that mean "no date" rather than a malformed one.
const NO_DATE: &[&str] = &["none", "n/a", "na", "null", "tbd", "-"];

/// Parses model output for every operation kind.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    config: PipelineConfig,
    /// Whole-word, case-insensitive matcher per label, in label-set order.
    label_patterns: Vec<(String, Regex)>,
}

impl ResponseParser {
    pub fn new(config: PipelineConfig) -> Self {
        let label_patterns = config
            .labels
            .labels()
            .iter()
            .filter_map(|label| {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(label));
                Regex::new(&pattern).ok().map(|re| (label.clone(), re))
            })
            .collect();
        Self {
            config,
            label_patterns,
        }
    }

    pub fn parse(
        &self,
        kind: OperationKind,
        raw: &str,
        email_id: EmailId,
    ) -> Result<ParseOutcome, ParseError> {
        match kind {
            OperationKind::Categorize => Ok(self.parse_category(raw)),
            OperationKind::ExtractActions => parse_actions(raw),
            OperationKind::Summarize => parse_text(kind, raw, SUMMARY_KEYS)
                .map(|text| ParseOutcome::clean(OperationResult::Summary { text })),
            OperationKind::DraftReply => parse_draft(raw, email_id)
                .map(|draft| ParseOutcome::clean(OperationResult::DraftCandidate(draft))),
            OperationKind::ChatQuery => parse_text(kind, raw, ANSWER_KEYS)
                .map(|text| ParseOutcome::clean(OperationResult::ChatReply { text })),
        }
    }

    // ── Categorize ──────────────────────────────────────────────────

    /// Never fails: output with no recognizable label becomes the fallback
    /// label at zero confidence.
    fn parse_category(&self, raw: &str) -> ParseOutcome {
        let (candidate, confidence) = match json_object_with(raw, LABEL_KEYS) {
            Some(obj) => (
                string_field(&obj, LABEL_KEYS),
                ["confidence", "score"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(number_value)),
            ),
            None => (
                CATEGORY_LINE_RE
                    .captures(raw)
                    .map(|c| c[1].to_string()),
                text_confidence(raw),
            ),
        };

        // A structured label is matched on its own; otherwise scan the
        // whole response for the first label mentioned.
        let label = match candidate.as_deref() {
            Some(c) => self.match_label(c),
            None => self.match_label(raw),
        };

        let Some(label) = label else {
            let raw_label = candidate.unwrap_or_else(|| raw.trim().chars().take(80).collect());
            return ParseOutcome {
                result: OperationResult::Category(CategoryResult {
                    label: self.config.labels.fallback().to_string(),
                    confidence: 0.0,
                }),
                degradations: vec![Degradation::UnknownLabel { raw: raw_label }],
            };
        };

        let mut degradations = Vec::new();
        let confidence = match confidence.and_then(normalize_confidence) {
            Some(c) => c,
            None => {
                degradations.push(Degradation::MissingConfidence);
                self.config.default_confidence.clamp(0.0, 1.0)
            }
        };
        ParseOutcome {
            result: OperationResult::Category(CategoryResult { label, confidence }),
            degradations,
        }
    }

    /// Earliest whole-word label mention in `text`, in canonical spelling.
    fn match_label(&self, text: &str) -> Option<String> {
        if let Some(label) = self.config.labels.canonical(text.trim_matches(|c: char| {
            !c.is_alphanumeric()
        })) {
            return Some(label.to_string());
        }
        self.label_patterns
            .iter()
            .filter_map(|(label, re)| re.find(text).map(|m| (m.start(), label)))
            .min_by_key(|(pos, _)| *pos)
            .map(|(_, label)| label.clone())
    }
}

/// Confidence in text form: "Confidence: 0.9", "confidence 85%", "Meeting (85%)".
fn text_confidence(raw: &str) -> Option<f64> {
    if let Some(caps) = CONFIDENCE_RE.captures(raw) {
        let value: f64 = caps[1].parse().ok()?;
        return Some(if caps.get(2).is_some() { value / 100.0 } else { value });
    }
    PERCENT_RE
        .captures(raw)
        .and_then(|c| c[1].parse::<f64>().ok())
        .map(|v| v / 100.0)
}

/// Clamp into [0, 1]. Values in (1, 100] are read as percentages.
fn normalize_confidence(value: f64) -> Option<f32> {
    if !value.is_finite() {
        return None;
    }
    let value = if value > 1.0 && value <= 100.0 {
        value / 100.0
    } else {
        value
    };
    Some(value.clamp(0.0, 1.0) as f32)
}

// ── Actions ─────────────────────────────────────────────────────────

fn parse_actions(raw: &str) -> Result<ParseOutcome, ParseError> {
    if raw.trim().is_empty() {
        return Err(ParseError::EmptyModelResponse {
            kind: OperationKind::ExtractActions,
        });
    }

    let items = parse_json(raw).and_then(|value| match value {
        Value::Array(items) => Some(items),
        Value::Object(mut obj) => {
            let key = ACTION_LIST_KEYS.iter().find(|k| obj.get(**k).is_some_and(Value::is_array));
            match key {
                Some(key) => match obj.remove(*key) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                },
                // A single action object on its own.
                None if DESCRIPTION_KEYS.iter().any(|k| obj.contains_key(*k)) => {
                    Some(vec![Value::Object(obj)])
                }
                None => None,
            }
        }
        _ => None,
    });

    let Some(items) = items else {
        return Ok(parse_action_lines(raw));
    };

    let mut actions = Vec::new();
    let mut degradations = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        match action_from_value(index, item, &mut degradations) {
            Ok(action) => actions.push(action),
            Err(reason) => degradations.push(Degradation::ActionDropped { index, reason }),
        }
    }
    Ok(ParseOutcome {
        result: OperationResult::ActionList { actions },
        degradations,
    })
}

fn action_from_value(
    index: usize,
    item: Value,
    degradations: &mut Vec<Degradation>,
) -> Result<Action, String> {
    let obj = match item {
        Value::String(s) if !s.trim().is_empty() => {
            return Ok(Action {
                description: s.trim().to_string(),
                due_date: None,
                priority: Priority::default(),
            });
        }
        Value::Object(obj) => obj,
        other => return Err(format!("expected an object, got {}", json_type(&other))),
    };

    let description =
        string_field(&obj, DESCRIPTION_KEYS).ok_or_else(|| "missing description".to_string())?;

    let due = string_field(&obj, DUE_KEYS)
        .filter(|d| !NO_DATE.iter().any(|none| d.eq_ignore_ascii_case(none)));
    let due_date = match due {
        None => None,
        Some(raw) => match parse_due_date(&raw) {
            Some(date) => Some(date),
            None => {
                degradations.push(Degradation::DueDateIgnored { index, raw });
                None
            }
        },
    };

    let priority = string_field(&obj, &["priority"])
        .and_then(|p| p.parse().ok())
        .unwrap_or_default();

    Ok(Action {
        description,
        due_date,
        priority,
    })
}

/// ISO date, or an RFC 3339 timestamp reduced to its date.
fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// No structured list: take bullet and numbered lines as action descriptions.
fn parse_action_lines(raw: &str) -> ParseOutcome {
    let actions = raw
        .lines()
        .filter_map(|line| BULLET_RE.captures(line))
        .map(|caps| Action {
            description: caps[1].to_string(),
            due_date: None,
            priority: Priority::default(),
        })
        .collect();
    ParseOutcome {
        result: OperationResult::ActionList { actions },
        degradations: vec![Degradation::UnstructuredActions],
    }
}

// ── Summary / chat ──────────────────────────────────────────────────

fn parse_text(kind: OperationKind, raw: &str, keys: &[&str]) -> Result<String, ParseError> {
    let text = match json_object_with(raw, keys) {
        Some(obj) => string_field(&obj, keys).unwrap_or_default(),
        None => strip_fences(raw).to_string(),
    };
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseError::EmptyModelResponse { kind });
    }
    Ok(text.to_string())
}

// ── Draft ───────────────────────────────────────────────────────────

fn parse_draft(raw: &str, in_reply_to: EmailId) -> Result<DraftCandidate, ParseError> {
    if raw.trim().is_empty() {
        return Err(ParseError::IncompleteDraft { missing: "body" });
    }

    let (subject, body) = match json_object_with(raw, DRAFT_KEYS) {
        Some(obj) => (
            string_field(&obj, &["subject"]),
            string_field(&obj, &["body", "reply", "text"]),
        ),
        None => text_draft(strip_fences(raw)),
    };

    let body = body
        .filter(|b| !b.trim().is_empty())
        .ok_or(ParseError::IncompleteDraft { missing: "body" })?;
    let subject = subject
        .filter(|s| !s.trim().is_empty())
        .ok_or(ParseError::IncompleteDraft { missing: "subject" })?;

    Ok(DraftCandidate {
        subject: subject.trim().to_string(),
        body: body.trim().to_string(),
        in_reply_to,
    })
}

/// "Subject: ..." line plus a "Body:" section. Without a body marker, the
/// text after the subject line (or all of it) is the body.
fn text_draft(text: &str) -> (Option<String>, Option<String>) {
    let subject_line = SUBJECT_LINE_RE.captures(text);
    let subject = subject_line.as_ref().map(|c| c[1].to_string());

    let body = match (BODY_MARKER_RE.find(text), subject_line.and_then(|c| c.get(0))) {
        (Some(marker), _) => &text[marker.end()..],
        (None, Some(line)) => &text[line.end()..],
        (None, None) => text,
    };
    (subject, Some(body.to_string()))
}

// ── JSON helpers ────────────────────────────────────────────────────

/// Parse the first JSON value found in model output, if any.
fn parse_json(text: &str) -> Option<Value> {
    let candidate = extract_json(text)?;
    serde_json::from_str(candidate).ok()
}

/// The JSON object in model output, if it carries at least one of `keys`.
/// An unrelated object quoted inside prose leaves the text to the plain-text
/// path.
fn json_object_with(text: &str, keys: &[&str]) -> Option<Map<String, Value>> {
    match parse_json(text)? {
        Value::Object(obj) if keys.iter().any(|k| obj.contains_key(*k)) => Some(obj),
        _ => None,
    }
}

/// Locate a JSON object or array in text that may be wrapped in a
/// markdown code block or surrounded by prose.
fn extract_json(text: &str) -> Option<&str> {
    let trimmed = strip_fences(text);

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some(trimmed);
    }

    // Outermost bounds of whichever container opens first.
    let start = trimmed.find(['{', '['])?;
    let close = if trimmed.as_bytes()[start] == b'{' { '}' } else { ']' };
    let end = trimmed.rfind(close)?;
    (end > start).then(|| &trimmed[start..=end])
}

/// Contents of the first fenced code block, or the trimmed text.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    // Skip a language tag on the opening fence.
    let after = match after.find('\n') {
        Some(nl) if !after[..nl].trim().contains(' ') => &after[nl + 1..],
        _ => after,
    };
    match after.find("```") {
        Some(end) => after[..end].trim(),
        None => trimmed,
    }
}

/// First non-empty string (or number) among `keys`.
fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(pct) => pct.trim().parse::<f64>().ok().map(|v| v / 100.0),
                None => s.parse().ok(),
            }
        }
        _ => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "an empty string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LabelSet;

    fn parser() -> ResponseParser {
        ResponseParser::new(PipelineConfig::default())
    }

    fn category(outcome: &ParseOutcome) -> (&str, f32) {
        match &outcome.result {
            OperationResult::Category(c) => (c.label.as_str(), c.confidence),
            other => panic!("expected category, got {other:?}"),
        }
    }

    fn actions(outcome: &ParseOutcome) -> &[Action] {
        match &outcome.result {
            OperationResult::ActionList { actions } => actions,
            other => panic!("expected actions, got {other:?}"),
        }
    }

    fn parse(kind: OperationKind, raw: &str) -> Result<ParseOutcome, ParseError> {
        parser().parse(kind, raw, EmailId(1))
    }

    #[test]
    fn category_from_json() {
        let outcome = parse(
            OperationKind::Categorize,
            r#"{"label": "Meeting", "confidence": 0.92}"#,
        )
        .unwrap();
        assert_eq!(category(&outcome), ("Meeting", 0.92));
        assert!(!outcome.is_degraded());
    }

    #[test]
    fn category_from_markdown_wrapped_json() {
        let raw = "Here you go:\n```json\n{\"category\": \"spam\", \"confidence\": \"85%\"}\n```";
        let outcome = parse(OperationKind::Categorize, raw).unwrap();
        let (label, confidence) = category(&outcome);
        assert_eq!(label, "Spam");
        assert!((confidence - 0.85).abs() < 1e-6);
    }

    #[test]
    fn category_from_text_forms() {
        let outcome = parse(OperationKind::Categorize, "Category: Task\nConfidence: 0.7").unwrap();
        assert_eq!(category(&outcome), ("Task", 0.7));

        let outcome = parse(OperationKind::Categorize, "Newsletter (85%)").unwrap();
        let (label, confidence) = category(&outcome);
        assert_eq!(label, "Newsletter");
        assert!((confidence - 0.85).abs() < 1e-6);
    }

    #[test]
    fn category_confidence_clamped() {
        let outcome = parse(
            OperationKind::Categorize,
            r#"{"label": "Personal", "confidence": 250}"#,
        )
        .unwrap();
        assert_eq!(category(&outcome), ("Personal", 1.0));

        let outcome = parse(
            OperationKind::Categorize,
            r#"{"label": "Personal", "confidence": -0.3}"#,
        )
        .unwrap();
        assert_eq!(category(&outcome), ("Personal", 0.0));

        let outcome = parse(
            OperationKind::Categorize,
            r#"{"label": "Personal", "confidence": 80}"#,
        )
        .unwrap();
        assert_eq!(category(&outcome), ("Personal", 0.8));
    }

    #[test]
    fn known_label_without_confidence_gets_default() {
        let outcome =
            parse(OperationKind::Categorize, "I think this is a meeting invite.").unwrap();
        assert_eq!(category(&outcome), ("Meeting", 0.5));
        assert_eq!(outcome.degradations, vec![Degradation::MissingConfidence]);
    }

    #[test]
    fn garbage_category_falls_back() {
        let outcome = parse(OperationKind::Categorize, "lorem ipsum dolor sit amet").unwrap();
        assert_eq!(category(&outcome), ("Other", 0.0));
        assert!(matches!(
            outcome.degradations[0],
            Degradation::UnknownLabel { .. }
        ));

        let outcome = parse(OperationKind::Categorize, "").unwrap();
        assert_eq!(category(&outcome), ("Other", 0.0));
    }

    #[test]
    fn unknown_json_label_falls_back() {
        let outcome = parse(
            OperationKind::Categorize,
            r#"{"label": "Urgent", "confidence": 0.99}"#,
        )
        .unwrap();
        assert_eq!(category(&outcome), ("Other", 0.0));
        assert_eq!(
            outcome.degradations,
            vec![Degradation::UnknownLabel {
                raw: "Urgent".into()
            }]
        );
    }

    #[test]
    fn labels_match_whole_words_only() {
        // "Tasks" and "Spammy" are not labels.
        let outcome = parse(OperationKind::Categorize, "Spammy tasks everywhere").unwrap();
        assert_eq!(category(&outcome).0, "Other");
    }

    #[test]
    fn custom_label_set_is_respected() {
        let parser = ResponseParser::new(PipelineConfig {
            labels: LabelSet::new(["Invoice", "Receipt"]),
            ..PipelineConfig::default()
        });
        let outcome = parser
            .parse(OperationKind::Categorize, "receipt", EmailId(1))
            .unwrap();
        assert_eq!(category(&outcome).0, "Receipt");
        let outcome = parser
            .parse(OperationKind::Categorize, "Meeting", EmailId(1))
            .unwrap();
        assert_eq!(category(&outcome).0, "Other");
    }

    #[test]
    fn actions_from_json_array() {
        let raw = r#"[
            {"description": "Send Q3 numbers", "due_date": "2024-01-19", "priority": "high"},
            {"task": "Book room", "deadline": "2024-01-18T17:00:00Z"},
            {"title": "Reply to Sarah"}
        ]"#;
        let outcome = parse(OperationKind::ExtractActions, raw).unwrap();
        let list = actions(&outcome);
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].priority, Priority::High);
        assert_eq!(list[0].due_date, NaiveDate::from_ymd_opt(2024, 1, 19));
        assert_eq!(list[1].due_date, NaiveDate::from_ymd_opt(2024, 1, 18));
        assert_eq!(list[2].priority, Priority::Med);
        assert!(!outcome.is_degraded());
    }

    #[test]
    fn actions_partial_success_keeps_good_items() {
        let raw = r#"{"actions": [
            {"description": "Submit report", "due_date": "Friday"},
            {"priority": "high"},
            42,
            {"description": "Call back"}
        ]}"#;
        let outcome = parse(OperationKind::ExtractActions, raw).unwrap();
        let list = actions(&outcome);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].description, "Submit report");
        assert_eq!(list[0].due_date, None);
        assert_eq!(list[1].description, "Call back");
        assert_eq!(
            outcome.degradations,
            vec![
                Degradation::DueDateIgnored {
                    index: 0,
                    raw: "Friday".into()
                },
                Degradation::ActionDropped {
                    index: 1,
                    reason: "missing description".into()
                },
                Degradation::ActionDropped {
                    index: 2,
                    reason: "expected an object, got a number".into()
                },
            ]
        );
    }

    #[test]
    fn empty_action_list_is_not_degraded() {
        let outcome = parse(OperationKind::ExtractActions, "[]").unwrap();
        assert!(actions(&outcome).is_empty());
        assert!(!outcome.is_degraded());
    }

    #[test]
    fn actions_from_bullets() {
        let raw = "Action items:\n- Review the budget\n2. Confirm attendance\nThanks!";
        let outcome = parse(OperationKind::ExtractActions, raw).unwrap();
        let list = actions(&outcome);
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].description, "Confirm attendance");
        assert_eq!(outcome.degradations, vec![Degradation::UnstructuredActions]);
    }

    #[test]
    fn empty_output_fails_for_actions_and_summary() {
        assert!(matches!(
            parse(OperationKind::ExtractActions, "   "),
            Err(ParseError::EmptyModelResponse { .. })
        ));
        assert!(matches!(
            parse(OperationKind::Summarize, ""),
            Err(ParseError::EmptyModelResponse { .. })
        ));
        assert!(matches!(
            parse(OperationKind::ChatQuery, "\n"),
            Err(ParseError::EmptyModelResponse { .. })
        ));
    }

    #[test]
    fn summary_accepts_text_and_json() {
        let outcome = parse(OperationKind::Summarize, "  Budget sync moved to Friday.  ").unwrap();
        assert_eq!(
            outcome.result,
            OperationResult::Summary {
                text: "Budget sync moved to Friday.".into()
            }
        );
        let outcome = parse(OperationKind::Summarize, r#"{"summary": "Short."}"#).unwrap();
        assert_eq!(
            outcome.result,
            OperationResult::Summary {
                text: "Short.".into()
            }
        );
    }

    #[test]
    fn draft_from_text() {
        let raw = "Subject: Re: Q3 Budget Sync\nBody:\nHi Sarah,\n\nI'll be there.\n\nBest";
        let outcome = parser().parse(OperationKind::DraftReply, raw, EmailId(2)).unwrap();
        let OperationResult::DraftCandidate(draft) = outcome.result else {
            panic!("expected draft");
        };
        assert_eq!(draft.subject, "Re: Q3 Budget Sync");
        assert!(draft.body.starts_with("Hi Sarah,"));
        assert!(draft.body.ends_with("Best"));
        assert_eq!(draft.in_reply_to, EmailId(2));
    }

    #[test]
    fn draft_from_json() {
        let raw = r#"```json
{"subject": "Re: Lunch", "body": "Sounds good!"}
```"#;
        let outcome = parse(OperationKind::DraftReply, raw).unwrap();
        let OperationResult::DraftCandidate(draft) = outcome.result else {
            panic!("expected draft");
        };
        assert_eq!(draft.subject, "Re: Lunch");
        assert_eq!(draft.body, "Sounds good!");
    }

    #[test]
    fn draft_missing_body_is_incomplete() {
        let err = parse(OperationKind::DraftReply, "Subject: Re: Lunch\nBody:\n   ").unwrap_err();
        assert!(matches!(err, ParseError::IncompleteDraft { missing: "body" }));

        let err = parse(OperationKind::DraftReply, r#"{"subject": "Re: Lunch"}"#).unwrap_err();
        assert!(matches!(err, ParseError::IncompleteDraft { missing: "body" }));
    }

    #[test]
    fn draft_missing_subject_is_incomplete() {
        let err = parse(OperationKind::DraftReply, "Thanks, see you then.").unwrap_err();
        assert!(matches!(
            err,
            ParseError::IncompleteDraft { missing: "subject" }
        ));
    }

    #[test]
    fn extract_json_embedded_in_text() {
        assert_eq!(
            extract_json(r#"Sure! {"label": "Task"} Hope that helps."#),
            Some(r#"{"label": "Task"}"#)
        );
        assert_eq!(extract_json("list: [1, 2] done"), Some("[1, 2]"));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn strip_fences_handles_language_tag() {
        assert_eq!(strip_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("```\nplain\n```"), "plain");
        assert_eq!(strip_fences("no fences"), "no fences");
    }

    #[test]
    fn summary_quoting_unrelated_json_is_kept_as_text() {
        let raw = r#"The sender shares a config snippet {"retries": 3} and asks whether it is safe."#;
        let outcome = parse(OperationKind::Summarize, raw).unwrap();
        assert_eq!(outcome.result, OperationResult::Summary { text: raw.into() });
    }

    #[test]
    fn chat_answer_quoting_unrelated_json_is_kept_as_text() {
        let raw = r#"Yes, the payload they sent was {"status": "ok"}."#;
        let outcome = parse(OperationKind::ChatQuery, raw).unwrap();
        assert_eq!(outcome.result, OperationResult::ChatReply { text: raw.into() });
    }

    #[test]
    fn draft_body_quoting_json_keeps_text_layout() {
        let raw = "Subject: Re: API config\nBody:\nHi Sam,\n\n\
                   Please use {\"timeout\": 30} in the client.\n\nThanks";
        let outcome = parse(OperationKind::DraftReply, raw).unwrap();
        let OperationResult::DraftCandidate(draft) = outcome.result else {
            panic!("expected draft");
        };
        assert_eq!(draft.subject, "Re: API config");
        assert!(draft.body.contains(r#"{"timeout": 30}"#));
        assert!(draft.body.ends_with("Thanks"));
    }

    #[test]
    fn category_line_survives_unrelated_json() {
        let raw = "Category: Task\nConfidence: 0.8\nThey attached {\"id\": 7}.";
        let outcome = parse(OperationKind::Categorize, raw).unwrap();
        assert_eq!(category(&outcome), ("Task", 0.8));
    }

    #[test]
    fn placeholder_due_dates_mean_no_date() {
        let raw = r#"[
            {"description": "Read the newsletter", "due_date": "N/A"},
            {"description": "File expenses", "deadline": "none"}
        ]"#;
        let outcome = parse(OperationKind::ExtractActions, raw).unwrap();
        let list = actions(&outcome);
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|a| a.due_date.is_none()));
        assert!(!outcome.is_degraded());
    }

    #[test]
    fn categorize_always_yields_a_known_label() {
        use rand::Rng;

        let parser = parser();
        let labels = PipelineConfig::default().labels;
        let mut rng = rand::thread_rng();

        let mut inputs: Vec<String> = Vec::new();
        for _ in 0..300 {
            let len = rng.gen_range(0..120);
            let bytes: Vec<u8> = (0..len).map(|_| rng.r#gen::<u8>()).collect();
            inputs.push(String::from_utf8_lossy(&bytes).into_owned());
            let chars: String = (0..len).map(|_| rng.r#gen::<char>()).collect();
            inputs.push(chars);
        }

        let json = r#"{"label": "Meeting", "confidence": 0.93}"#;
        for (end, _) in json.char_indices() {
            inputs.push(json[..end].to_string());
            inputs.push(format!("```json\n{}", &json[..end]));
        }
        inputs.extend(
            [
                "```json\n```json\n{\"label\": \"Task\"}\n```\n```",
                "``````",
                "```\n```\n```",
                "{\"label\": {\"nested\": [1, 2, {\"label\": \"Spam\"}]}}",
                "[[[[[[[[[[[[[[[[",
                "{\"confidence\": \"NaN\", \"label\": \"Personal\"}",
                "{\"confidence\": 1e309, \"label\": \"Personal\"}",
                "Confidence: 99999999999999999999999999%",
                "🦀 Category: 🦀\nconfidence .",
            ]
            .map(String::from),
        );

        for raw in &inputs {
            let outcome = parser
                .parse(OperationKind::Categorize, raw, EmailId(1))
                .unwrap_or_else(|e| panic!("categorize failed on {raw:?}: {e}"));
            let (label, confidence) = category(&outcome);
            assert!(labels.contains(label), "label {label:?} from {raw:?}");
            assert!(
                (0.0..=1.0).contains(&confidence),
                "confidence {confidence} from {raw:?}"
            );
        }
    }
}
