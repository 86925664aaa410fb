//! Read-only email store.
//!
//! The inbox is loaded once and shared behind an `Arc`. Nothing in the
//! pipeline mutates an [`Email`]; derived data (categories, actions, drafts)
//! lives in the output stores keyed by [`EmailId`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier of an email in the inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailId(pub u32);

impl std::fmt::Display for EmailId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An email as loaded into the inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    pub id: EmailId,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
    /// Labels the message already carried when loaded.
    #[serde(default)]
    pub existing_labels: BTreeSet<String>,
}

impl Email {
    /// Create an email received now, with no labels.
    pub fn new(
        id: u32,
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: EmailId(id),
            sender: sender.into(),
            subject: subject.into(),
            body: body.into(),
            received_at: Utc::now(),
            existing_labels: BTreeSet::new(),
        }
    }

    /// Builder: set the received timestamp.
    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    /// Builder: add a pre-existing label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.existing_labels.insert(label.into());
        self
    }
}

/// Immutable collection of emails, ordered by id.
#[derive(Debug, Clone, Default)]
pub struct Inbox {
    emails: BTreeMap<EmailId, Email>,
}

impl Inbox {
    /// Build an inbox from emails. Later duplicates of an id replace earlier ones.
    pub fn new(emails: impl IntoIterator<Item = Email>) -> Self {
        Self {
            emails: emails.into_iter().map(|e| (e.id, e)).collect(),
        }
    }

    /// The fixed demo inbox.
    pub fn mock() -> Self {
        Self::new(mock_emails())
    }

    pub fn get(&self, id: EmailId) -> Option<&Email> {
        self.emails.get(&id)
    }

    /// All emails, lowest id first.
    pub fn list(&self) -> impl Iterator<Item = &Email> {
        self.emails.values()
    }

    pub fn ids(&self) -> Vec<EmailId> {
        self.emails.keys().copied().collect()
    }

    /// Emails whose sender, subject or body contains `query`, ignoring case.
    /// A blank query matches nothing.
    pub fn search(&self, query: &str) -> Vec<&Email> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.emails
            .values()
            .filter(|e| {
                [&e.sender, &e.subject, &e.body]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

fn at(timestamp: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

fn mock_emails() -> Vec<Email> {
    vec![
        Email::new(
            1,
            "project.manager@company.com",
            "Weekly Project Update - Urgent Review Needed",
            "Hi team, we need to review the Q4 deliverables by tomorrow. Please prepare your \
             status reports and be ready to discuss blockers. The meeting is scheduled for \
             10 AM tomorrow.",
        )
        .with_received_at(at("2024-01-15 09:30:00"))
        .with_label("unread"),
        Email::new(
            2,
            "newsletter@technews.com",
            "Weekly Tech Digest: AI Innovations",
            "This week in AI: New breakthroughs in language models, industry updates, and more. \
             Read about the latest developments in machine learning and artificial intelligence.",
        )
        .with_received_at(at("2024-01-15 08:15:00")),
        Email::new(
            3,
            "hr@company.com",
            "Benefits Enrollment Reminder",
            "Reminder: Open enrollment for health benefits ends this Friday. Please complete \
             your selections in the portal.",
        )
        .with_received_at(at("2024-01-14 14:20:00"))
        .with_label("unread"),
        Email::new(
            4,
            "meeting.request@partner.com",
            "Meeting Request: Project Collaboration",
            "Would you be available for a 30-minute call next Tuesday to discuss potential \
             collaboration? Please let me know what time works best for you.",
        )
        .with_received_at(at("2024-01-14 11:45:00"))
        .with_label("unread"),
        Email::new(
            5,
            "noreply@system.com",
            "Your weekly system report",
            "System generated report for the week. No action needed.",
        )
        .with_received_at(at("2024-01-14 10:00:00")),
    ]
}
