//! In-memory store of completed operations, keyed by email and operation.
//!
//! Categories live here rather than on the `Email`, which stays immutable.
//! A later run of the same operation replaces the earlier result.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use crate::inbox::EmailId;
use crate::pipeline::types::{EmailAction, OperationResult, ProcessedOperation};
use crate::templates::OperationKind;

#[derive(Default)]
pub struct ResultStore {
    results: RwLock<HashMap<(EmailId, OperationKind), ProcessedOperation>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a result, replacing any earlier one for the same key.
    pub async fn put(&self, processed: ProcessedOperation) {
        let key = (processed.email_id, processed.kind);
        self.results.write().await.insert(key, processed);
    }

    pub async fn get(
        &self,
        email_id: EmailId,
        kind: OperationKind,
    ) -> Option<ProcessedOperation> {
        self.results.read().await.get(&(email_id, kind)).cloned()
    }

    /// Every stored result for one email, in operation order.
    pub async fn for_email(&self, email_id: EmailId) -> Vec<ProcessedOperation> {
        let results = self.results.read().await;
        let mut out: Vec<_> = results
            .values()
            .filter(|p| p.email_id == email_id)
            .cloned()
            .collect();
        out.sort_by_key(|p| p.kind);
        out
    }

    /// Current category label of each categorized email.
    pub async fn categories(&self) -> BTreeMap<EmailId, String> {
        self.results
            .read()
            .await
            .values()
            .filter_map(|p| match &p.result {
                OperationResult::Category(c) => Some((p.email_id, c.label.clone())),
                _ => None,
            })
            .collect()
    }

    /// Stored summary text per email.
    pub async fn summaries(&self) -> BTreeMap<EmailId, String> {
        self.results
            .read()
            .await
            .values()
            .filter_map(|p| match &p.result {
                OperationResult::Summary { text } => Some((p.email_id, text.clone())),
                _ => None,
            })
            .collect()
    }

    /// Every extracted action across the inbox, by email id then list order.
    pub async fn actions(&self) -> Vec<EmailAction> {
        let results = self.results.read().await;
        let mut lists: Vec<_> = results
            .values()
            .filter_map(|p| match &p.result {
                OperationResult::ActionList { actions } => Some((p.email_id, actions)),
                _ => None,
            })
            .collect();
        lists.sort_by_key(|(email_id, _)| *email_id);
        lists
            .into_iter()
            .flat_map(|(email_id, actions)| {
                actions.iter().cloned().map(move |action| EmailAction { email_id, action })
            })
            .collect()
    }

    /// Number of emails per category label.
    pub async fn category_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for label in self.categories().await.into_values() {
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
    }

    pub async fn len(&self) -> usize {
        self.results.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.results.read().await.is_empty()
    }
}
