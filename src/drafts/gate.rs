//! Draft gate: the only way a draft reply leaves the pipeline.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::model::{DraftStatus, PendingDraft};
use crate::pipeline::types::DraftCandidate;

/// Holds pending drafts for review. There is no send path.
pub struct DraftGate {
    drafts: RwLock<VecDeque<PendingDraft>>,
}

impl DraftGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            drafts: RwLock::new(VecDeque::new()),
        })
    }

    /// Record a candidate as a new pending draft and return it.
    pub async fn submit(&self, candidate: DraftCandidate) -> PendingDraft {
        let draft = PendingDraft::from_candidate(candidate);
        info!(
            draft_id = %draft.id(),
            email_id = %draft.email_id(),
            subject = %draft.subject(),
            "Draft held for review"
        );
        self.drafts.write().await.push_back(draft.clone());
        draft
    }

    /// All drafts, oldest first.
    pub async fn list(&self) -> Vec<PendingDraft> {
        self.drafts.read().await.iter().cloned().collect()
    }

    pub async fn get(&self, draft_id: Uuid) -> Option<PendingDraft> {
        self.drafts
            .read()
            .await
            .iter()
            .find(|d| d.id() == draft_id)
            .cloned()
    }

    /// Number of drafts still awaiting review.
    pub async fn pending_count(&self) -> usize {
        self.drafts
            .read()
            .await
            .iter()
            .filter(|d| d.status() == DraftStatus::Pending)
            .count()
    }

    pub async fn len(&self) -> usize {
        self.drafts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.drafts.read().await.is_empty()
    }
}
