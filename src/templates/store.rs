//! Template store: one current template per operation, overwrite on save.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::model::{OperationKind, PromptTemplate, default_template_text, missing_placeholders};
use crate::error::TemplateError;

/// On-disk shape of one template.
#[derive(Debug, Serialize, Deserialize)]
struct StoredTemplate {
    text: String,
    version: u64,
}

/// Keyed store of the current prompt template per operation.
///
/// Reads run concurrently; saves are serialized by the write lock, which is
/// held across the file write so the file always reflects the latest save.
/// A change becomes visible only once it has been written.
pub struct TemplateStore {
    templates: RwLock<HashMap<OperationKind, PromptTemplate>>,
    defaults: HashMap<OperationKind, String>,
    path: Option<PathBuf>,
}

impl TemplateStore {
    /// A store seeded with the built-in template for every operation.
    pub fn with_defaults() -> Self {
        let defaults = OperationKind::ALL
            .into_iter()
            .map(|kind| (kind, default_template_text(kind).to_string()))
            .collect();
        Self::from_defaults(defaults)
    }

    /// A store with no templates and no defaults.
    pub fn empty() -> Self {
        Self::from_defaults(HashMap::new())
    }

    fn from_defaults(defaults: HashMap<OperationKind, String>) -> Self {
        let templates = defaults
            .iter()
            .map(|(kind, text)| {
                (
                    *kind,
                    PromptTemplate {
                        kind: *kind,
                        text: text.clone(),
                        version: 1,
                    },
                )
            })
            .collect();
        Self {
            templates: RwLock::new(templates),
            defaults,
            path: None,
        }
    }

    /// Open a store backed by a JSON file, seeded with defaults.
    ///
    /// A missing file means defaults only. Saved templates that no longer
    /// satisfy their placeholder requirements are skipped in favour of the
    /// default.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, TemplateError> {
        let path = path.into();
        let mut store = Self::with_defaults();

        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                let saved: BTreeMap<OperationKind, StoredTemplate> = serde_json::from_str(&raw)
                    .map_err(|e| persistence_error(&path, e))?;
                let templates = store.templates.get_mut();
                for (kind, stored) in saved {
                    let missing = missing_placeholders(kind, &stored.text);
                    if !missing.is_empty() {
                        warn!(
                            operation = %kind,
                            missing = ?missing,
                            "Ignoring saved template with missing placeholders"
                        );
                        continue;
                    }
                    templates.insert(
                        kind,
                        PromptTemplate {
                            kind,
                            text: stored.text,
                            version: stored.version,
                        },
                    );
                }
                info!(path = %path.display(), "Loaded prompt templates");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No template file yet, using defaults");
            }
            Err(e) => return Err(persistence_error(&path, e)),
        }

        store.path = Some(path);
        Ok(store)
    }

    /// Current template for an operation.
    pub async fn get(&self, kind: OperationKind) -> Result<PromptTemplate, TemplateError> {
        self.templates
            .read()
            .await
            .get(&kind)
            .cloned()
            .ok_or(TemplateError::NotFound { kind })
    }

    /// All current templates, in operation order.
    pub async fn list(&self) -> Vec<PromptTemplate> {
        let templates = self.templates.read().await;
        OperationKind::ALL
            .iter()
            .filter_map(|kind| templates.get(kind).cloned())
            .collect()
    }

    /// Replace the template for an operation. The version always increases.
    pub async fn save(
        &self,
        kind: OperationKind,
        text: impl Into<String>,
    ) -> Result<PromptTemplate, TemplateError> {
        let text = text.into();
        let missing = missing_placeholders(kind, &text);
        if !missing.is_empty() {
            return Err(TemplateError::Invalid { kind, missing });
        }

        let mut templates = self.templates.write().await;
        let version = templates.get(&kind).map_or(1, |t| t.version + 1);
        let template = PromptTemplate {
            kind,
            text,
            version,
        };
        let mut next = templates.clone();
        next.insert(kind, template.clone());
        self.persist(&next).await?;
        *templates = next;

        info!(operation = %kind, version, "Template saved");
        Ok(template)
    }

    /// Restore the built-in text for every operation that has one.
    pub async fn reset_to_defaults(&self) -> Result<Vec<PromptTemplate>, TemplateError> {
        let mut templates = self.templates.write().await;
        let next: HashMap<OperationKind, PromptTemplate> = self
            .defaults
            .iter()
            .map(|(kind, text)| {
                let version = templates.get(kind).map_or(1, |t| t.version + 1);
                (
                    *kind,
                    PromptTemplate {
                        kind: *kind,
                        text: text.clone(),
                        version,
                    },
                )
            })
            .collect();
        self.persist(&next).await?;
        *templates = next;

        info!("Templates reset to defaults");
        Ok(OperationKind::ALL
            .iter()
            .filter_map(|kind| templates.get(kind).cloned())
            .collect())
    }

    async fn persist(
        &self,
        templates: &HashMap<OperationKind, PromptTemplate>,
    ) -> Result<(), TemplateError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let stored: BTreeMap<OperationKind, StoredTemplate> = templates
            .values()
            .map(|t| {
                (
                    t.kind,
                    StoredTemplate {
                        text: t.text.clone(),
                        version: t.version,
                    },
                )
            })
            .collect();
        let json =
            serde_json::to_string_pretty(&stored).map_err(|e| persistence_error(path, e))?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| persistence_error(path, e))?;
        }
        tokio::fs::write(path, json)
            .await
            .map_err(|e| persistence_error(path, e))
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn persistence_error(path: &Path, e: impl std::fmt::Display) -> TemplateError {
    TemplateError::Persistence {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_available_at_version_one() {
        let store = TemplateStore::with_defaults();
        for kind in OperationKind::ALL {
            let template = store.get(kind).await.unwrap();
            assert_eq!(template.kind, kind);
            assert_eq!(template.version, 1);
        }
        assert_eq!(store.list().await.len(), 5);
    }

    #[tokio::test]
    async fn empty_store_reports_not_found() {
        let store = TemplateStore::empty();
        let err = store.get(OperationKind::Summarize).await.unwrap_err();
        assert!(matches!(
            err,
            TemplateError::NotFound {
                kind: OperationKind::Summarize
            }
        ));
    }

    #[tokio::test]
    async fn save_then_get_round_trips_and_bumps_version() {
        let store = TemplateStore::with_defaults();
        let text = "Summarize briefly: {body}";
        let saved = store.save(OperationKind::Summarize, text).await.unwrap();
        assert_eq!(saved.version, 2);

        let fetched = store.get(OperationKind::Summarize).await.unwrap();
        assert_eq!(fetched.text, text);
        assert_eq!(fetched.version, 2);

        let again = store.save(OperationKind::Summarize, text).await.unwrap();
        assert_eq!(again.version, 3);
    }

    #[tokio::test]
    async fn save_into_empty_store_starts_at_one() {
        let store = TemplateStore::empty();
        let saved = store
            .save(OperationKind::ExtractActions, "Tasks in: {body}")
            .await
            .unwrap();
        assert_eq!(saved.version, 1);
    }

    #[tokio::test]
    async fn save_rejects_missing_placeholders() {
        let store = TemplateStore::with_defaults();
        let err = store
            .save(OperationKind::DraftReply, "Reply to {sender}")
            .await
            .unwrap_err();
        match err {
            TemplateError::Invalid { kind, missing } => {
                assert_eq!(kind, OperationKind::DraftReply);
                assert_eq!(missing, vec!["subject".to_string(), "body".to_string()]);
            }
            other => panic!("Expected Invalid, got {:?}", other),
        }
        // Rejected save leaves the current template untouched
        let current = store.get(OperationKind::DraftReply).await.unwrap();
        assert_eq!(current.version, 1);
    }

    #[tokio::test]
    async fn reset_restores_default_text_with_new_version() {
        let store = TemplateStore::with_defaults();
        store
            .save(OperationKind::Categorize, "Label {subject}: {body}")
            .await
            .unwrap();

        let reset = store.reset_to_defaults().await.unwrap();
        assert_eq!(reset.len(), 5);

        let categorize = store.get(OperationKind::Categorize).await.unwrap();
        assert_eq!(
            categorize.text,
            default_template_text(OperationKind::Categorize)
        );
        assert_eq!(categorize.version, 3);
    }

    #[tokio::test]
    async fn file_backed_store_persists_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prompts.json");

        let store = TemplateStore::open(&path).await.unwrap();
        store
            .save(OperationKind::Summarize, "TL;DR {body}")
            .await
            .unwrap();
        assert!(path.exists());

        let reopened = TemplateStore::open(&path).await.unwrap();
        let template = reopened.get(OperationKind::Summarize).await.unwrap();
        assert_eq!(template.text, "TL;DR {body}");
        assert_eq!(template.version, 2);
        // Untouched kinds come back from the file too
        assert_eq!(
            reopened.get(OperationKind::ChatQuery).await.unwrap().version,
            1
        );
    }

    #[tokio::test]
    async fn failed_write_leaves_templates_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("conf");
        let path = parent.join("prompts.json");
        let store = TemplateStore::open(&path).await.unwrap();

        // A plain file where the directory should be makes every write fail.
        std::fs::write(&parent, "not a directory").unwrap();

        let err = store
            .save(OperationKind::Summarize, "New {body}")
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::Persistence { .. }));
        let current = store.get(OperationKind::Summarize).await.unwrap();
        assert_eq!(current.version, 1);
        assert_eq!(current.text, default_template_text(OperationKind::Summarize));

        let err = store.reset_to_defaults().await.unwrap_err();
        assert!(matches!(err, TemplateError::Persistence { .. }));
        for template in store.list().await {
            assert_eq!(template.version, 1);
        }
    }

    #[tokio::test]
    async fn invalid_saved_template_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.json");
        std::fs::write(
            &path,
            r#"{"summarize": {"text": "no placeholders here", "version": 7}}"#,
        )
        .unwrap();

        let store = TemplateStore::open(&path).await.unwrap();
        let template = store.get(OperationKind::Summarize).await.unwrap();
        assert_eq!(template.text, default_template_text(OperationKind::Summarize));
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.json");
        std::fs::write(&path, "not json").unwrap();

        let result = TemplateStore::open(&path).await;
        assert!(matches!(result, Err(TemplateError::Persistence { .. })));
    }

    #[tokio::test]
    async fn concurrent_saves_yield_distinct_versions() {
        let store = std::sync::Arc::new(TemplateStore::with_defaults());
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .save(OperationKind::Summarize, format!("v{i} {{body}}"))
                        .await
                        .unwrap()
                        .version
                })
            })
            .collect();

        let mut versions = Vec::new();
        for handle in handles {
            versions.push(handle.await.unwrap());
        }
        versions.sort_unstable();
        assert_eq!(versions, (2..=11).collect::<Vec<u64>>());
    }
}
