//! Pending draft model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::inbox::EmailId;
use crate::pipeline::types::DraftCandidate;

/// Review state of a draft.
///
/// The core only ever creates `Pending` drafts. Moving a draft to
/// `Approved` or `Discarded` is a user action owned by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    /// Waiting for the user to review.
    Pending,
    /// The user accepted the draft.
    Approved,
    /// The user threw the draft away.
    Discarded,
}

impl std::fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Discarded => write!(f, "discarded"),
        }
    }
}

/// A model-written reply held for human review. Never sent by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDraft {
    id: Uuid,
    email_id: EmailId,
    subject: String,
    body: String,
    created_at: DateTime<Utc>,
    status: DraftStatus,
}

impl PendingDraft {
    /// Wrap a candidate as a new pending draft.
    pub(crate) fn from_candidate(candidate: DraftCandidate) -> Self {
        Self {
            id: Uuid::new_v4(),
            email_id: candidate.in_reply_to,
            subject: candidate.subject,
            body: candidate.body,
            created_at: Utc::now(),
            status: DraftStatus::Pending,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn email_id(&self) -> EmailId {
        self.email_id
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> DraftStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_draft_is_pending() {
        let draft = PendingDraft::from_candidate(DraftCandidate {
            subject: "Re: Lunch".into(),
            body: "Sure".into(),
            in_reply_to: EmailId(5),
        });
        assert_eq!(draft.status(), DraftStatus::Pending);
        assert_eq!(draft.email_id(), EmailId(5));
        assert_eq!(draft.subject(), "Re: Lunch");
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&DraftStatus::Discarded).unwrap();
        assert_eq!(json, "\"discarded\"");
        assert_eq!(DraftStatus::Pending.to_string(), "pending");
    }
}
