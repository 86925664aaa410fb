//! Read-only views over the inbox and stored results: search, urgent mail,
//! the action list, per-email details and an overview with recommendations.
//!
//! None of these call the model. They only reflect operations that have
//! already run.

use std::collections::BTreeMap;

use crate::inbox::{Email, EmailId};
use crate::pipeline::orchestrator::Orchestrator;
use crate::pipeline::types::{EmailAction, EmailDetails, EmailDigest, InboxOverview, Priority};

const SPAM_LABEL: &str = "Spam";
const NEWSLETTER_LABEL: &str = "Newsletter";

impl Orchestrator {
    /// An email with everything computed for it so far.
    pub async fn email_details(&self, email_id: EmailId) -> Option<EmailDetails> {
        let email = self.inbox().get(email_id)?.clone();
        let results = self.results().for_email(email_id).await;
        Some(EmailDetails { email, results })
    }

    /// Emails matching `query` in sender, subject or body.
    pub async fn search(&self, query: &str) -> Vec<EmailDigest> {
        let hits = self.inbox().search(query);
        tracing::debug!(query, hits = hits.len(), "Inbox search");
        self.digests(hits).await
    }

    /// Emails filed under an urgent category or carrying a high-priority action.
    pub async fn urgent(&self) -> Vec<EmailDigest> {
        let categories = self.results().categories().await;
        let high_priority: Vec<EmailId> = self
            .results()
            .actions()
            .await
            .into_iter()
            .filter(|a| a.action.priority == Priority::High)
            .map(|a| a.email_id)
            .collect();

        let urgent = self
            .inbox()
            .list()
            .filter(|e| {
                categories.get(&e.id).is_some_and(|label| self.is_urgent_label(label))
                    || high_priority.contains(&e.id)
            })
            .collect();
        self.digests(urgent).await
    }

    /// Every extracted action item across the inbox.
    pub async fn all_actions(&self) -> Vec<EmailAction> {
        self.results().actions().await
    }

    /// Stats plus suggestions on what to look at or clean up.
    pub async fn overview(&self) -> InboxOverview {
        let stats = self.inbox_stats().await;
        let urgent = self.urgent().await.len();
        let open_actions = self.all_actions().await.len();

        let mut recommendations = Vec::new();
        if stats.uncategorized > 0 {
            recommendations.push(format!(
                "{} not triaged yet",
                plural(stats.uncategorized, "email", "emails")
            ));
        }
        if open_actions > 0 {
            recommendations.push(format!(
                "{} requiring attention",
                plural(open_actions, "action item", "action items")
            ));
        }
        if urgent == 0 {
            recommendations.push("No urgent emails right now".to_string());
        } else {
            recommendations.push(format!(
                "{} need review",
                plural(urgent, "urgent email", "urgent emails")
            ));
        }
        let spam = label_count(&stats.by_label, SPAM_LABEL);
        if spam > 0 {
            recommendations.push(format!(
                "{} can be deleted",
                plural(spam, "spam email", "spam emails")
            ));
        }
        let newsletters = label_count(&stats.by_label, NEWSLETTER_LABEL);
        if newsletters > 0 {
            recommendations.push(format!(
                "{} can be archived",
                plural(newsletters, "newsletter", "newsletters")
            ));
        }
        if stats.pending_drafts > 0 {
            recommendations.push(format!(
                "{} waiting for review",
                plural(stats.pending_drafts, "draft reply", "draft replies")
            ));
        }

        InboxOverview {
            stats,
            urgent,
            open_actions,
            recommendations,
        }
    }

    fn is_urgent_label(&self, label: &str) -> bool {
        self.urgent_labels()
            .iter()
            .any(|u| u.eq_ignore_ascii_case(label))
    }

    async fn digests(&self, emails: Vec<&Email>) -> Vec<EmailDigest> {
        let categories = self.results().categories().await;
        let summaries = self.results().summaries().await;
        emails
            .into_iter()
            .map(|e| EmailDigest {
                email_id: e.id,
                sender: e.sender.clone(),
                subject: e.subject.clone(),
                category: categories.get(&e.id).cloned(),
                summary: summaries.get(&e.id).cloned(),
            })
            .collect()
    }
}

fn label_count(by_label: &BTreeMap<String, usize>, label: &str) -> usize {
    by_label
        .iter()
        .filter(|(l, _)| l.eq_ignore_ascii_case(label))
        .map(|(_, n)| n)
        .sum()
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("1 {one}")
    } else {
        format!("{n} {many}")
    }
}
