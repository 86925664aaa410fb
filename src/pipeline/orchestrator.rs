//! Operation orchestrator: the pipeline entry point.
//!
//! **Core invariant: no reply leaves the pipeline without human review.**
//! Draft replies are handed to the `DraftGate` as pending drafts; there is
//! no send path.
//!
//! Flow per request:
//! 1. Look up the email and the current template
//! 2. Compose the prompt
//! 3. Invoke the model (retries live inside the client)
//! 4. Parse the raw output into a typed result
//! 5. Store the result, and hold any draft for review

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::drafts::DraftGate;
use crate::error::{OperationFailure, PipelineError};
use crate::inbox::{EmailId, Inbox};
use crate::llm::ModelClient;
use crate::pipeline::composer::Composer;
use crate::pipeline::parser::ResponseParser;
use crate::pipeline::types::{
    Action, CategoryResult, InboxStats, OperationRequest, OperationResult, ProcessedOperation,
    Stage, TriageReport,
};
use crate::results::ResultStore;
use crate::templates::{OperationKind, TemplateStore};

/// Category that makes triage also extract action items.
const TASK_LABEL: &str = "Task";

/// Tracks one request through the stage machine.
struct Run {
    email_id: EmailId,
    kind: OperationKind,
    stage: Stage,
}

impl Run {
    fn new(request: &OperationRequest) -> Self {
        Self {
            email_id: request.email_id,
            kind: request.kind,
            stage: Stage::Pending,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(
            self.stage.can_transition_to(next),
            "invalid stage transition {} -> {}",
            self.stage,
            next
        );
        debug!(
            email_id = %self.email_id,
            operation = %self.kind,
            from = %self.stage,
            to = %next,
            "Stage transition"
        );
        self.stage = next;
    }

    /// Fail at the current stage.
    fn fail(&mut self, error: impl Into<PipelineError>) -> OperationFailure {
        let error = error.into();
        let stage = self.stage;
        self.advance(Stage::Failed);
        warn!(
            email_id = %self.email_id,
            operation = %self.kind,
            stage = %stage,
            code = error.code(),
            error = %error,
            "Operation failed"
        );
        OperationFailure {
            email_id: self.email_id,
            kind: self.kind,
            stage,
            error,
        }
    }
}

/// Drives requests through compose → invoke → parse.
///
/// Holds no per-request state; the template, result and draft stores are
/// shared and injected.
pub struct Orchestrator {
    inbox: Arc<Inbox>,
    templates: Arc<TemplateStore>,
    composer: Composer,
    client: ModelClient,
    parser: ResponseParser,
    results: Arc<ResultStore>,
    drafts: Arc<DraftGate>,
    urgent_labels: Vec<String>,
}

impl Orchestrator {
    pub fn new(
        inbox: Arc<Inbox>,
        templates: Arc<TemplateStore>,
        client: ModelClient,
        config: PipelineConfig,
    ) -> Self {
        Self {
            inbox,
            templates,
            composer: Composer::new(config.clone()),
            client,
            urgent_labels: config.urgent_labels.clone(),
            parser: ResponseParser::new(config),
            results: Arc::new(ResultStore::new()),
            drafts: DraftGate::new(),
        }
    }

    /// Builder: share an existing result store.
    pub fn with_results(mut self, results: Arc<ResultStore>) -> Self {
        self.results = results;
        self
    }

    /// Builder: share an existing draft gate.
    pub fn with_drafts(mut self, drafts: Arc<DraftGate>) -> Self {
        self.drafts = drafts;
        self
    }

    pub fn inbox(&self) -> &Arc<Inbox> {
        &self.inbox
    }

    pub fn templates(&self) -> &Arc<TemplateStore> {
        &self.templates
    }

    pub fn results(&self) -> &Arc<ResultStore> {
        &self.results
    }

    pub fn drafts(&self) -> &Arc<DraftGate> {
        &self.drafts
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    pub fn urgent_labels(&self) -> &[String] {
        &self.urgent_labels
    }

    /// Run one operation to completion.
    pub async fn process(
        &self,
        request: OperationRequest,
    ) -> Result<ProcessedOperation, OperationFailure> {
        self.process_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Run one operation, giving up with `Cancelled` once `cancel` fires.
    ///
    /// Cancellation is observed between stages. A model call already in
    /// flight runs to completion and its output is discarded.
    pub async fn process_with_cancel(
        &self,
        request: OperationRequest,
        cancel: &CancellationToken,
    ) -> Result<ProcessedOperation, OperationFailure> {
        let mut run = Run::new(&request);
        info!(
            email_id = %request.email_id,
            operation = %request.kind,
            "Processing operation"
        );

        let Some(email) = self.inbox.get(request.email_id) else {
            return Err(run.fail(PipelineError::EmailNotFound {
                email_id: request.email_id,
            }));
        };
        if cancel.is_cancelled() {
            return Err(run.fail(PipelineError::Cancelled));
        }

        // Compose
        run.advance(Stage::Composing);
        let template = self
            .templates
            .get(request.kind)
            .await
            .map_err(|e| run.fail(e))?;
        let prompt = self
            .composer
            .compose(&template, email, &request.context)
            .map_err(|e| run.fail(e))?;
        if let Some(cut) = prompt.metadata.truncated_at {
            debug!(
                email_id = %email.id,
                body_chars = prompt.metadata.body_chars,
                truncated_at = cut,
                "Body truncated for prompt"
            );
        }
        if cancel.is_cancelled() {
            return Err(run.fail(PipelineError::Cancelled));
        }

        // Invoke
        run.advance(Stage::Invoking);
        let raw = self
            .client
            .invoke(&prompt)
            .await
            .map_err(|e| run.fail(e))?;
        if cancel.is_cancelled() {
            debug!(email_id = %email.id, "Discarding model output for cancelled request");
            return Err(run.fail(PipelineError::Cancelled));
        }

        // Parse
        run.advance(Stage::Parsing);
        let outcome = self
            .parser
            .parse(request.kind, &raw, email.id)
            .map_err(|e| run.fail(e))?;
        if outcome.is_degraded() {
            warn!(
                email_id = %email.id,
                operation = %request.kind,
                degradations = ?outcome.degradations,
                "Model output parsed with fallbacks"
            );
        }

        let draft_id = match &outcome.result {
            OperationResult::DraftCandidate(candidate) => {
                Some(self.drafts.submit(candidate.clone()).await.id())
            }
            _ => None,
        };

        let processed = ProcessedOperation {
            email_id: email.id,
            kind: request.kind,
            result: outcome.result,
            degradations: outcome.degradations,
            draft_id,
            template_version: template.version,
            completed_at: Utc::now(),
        };
        self.results.put(processed.clone()).await;

        run.advance(Stage::Done);
        info!(
            email_id = %email.id,
            operation = %request.kind,
            degraded = processed.is_degraded(),
            "Operation complete"
        );
        Ok(processed)
    }

    /// Run independent requests concurrently. Results line up with the input.
    pub async fn process_batch(
        &self,
        requests: Vec<OperationRequest>,
    ) -> Vec<Result<ProcessedOperation, OperationFailure>> {
        let count = requests.len();
        info!(count, "Processing operation batch");

        let results = join_all(requests.into_iter().map(|r| self.process(r))).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(total = count, failed, "Batch processing complete");
        results
    }

    /// Categorize, extract actions if the email is a task, then summarize.
    pub async fn triage(&self, email_id: EmailId) -> Result<TriageReport, OperationFailure> {
        let categorized = self
            .process(OperationRequest::new(email_id, OperationKind::Categorize))
            .await?;
        let mut degraded = categorized.is_degraded();
        let category = match categorized.result {
            OperationResult::Category(c) => c,
            _ => CategoryResult {
                label: String::new(),
                confidence: 0.0,
            },
        };

        let mut actions: Vec<Action> = Vec::new();
        if category.label.eq_ignore_ascii_case(TASK_LABEL) {
            let extracted = self
                .process(OperationRequest::new(email_id, OperationKind::ExtractActions))
                .await?;
            degraded |= extracted.is_degraded();
            if let OperationResult::ActionList { actions: list } = extracted.result {
                actions = list;
            }
        }

        let summarized = self
            .process(OperationRequest::new(email_id, OperationKind::Summarize))
            .await?;
        degraded |= summarized.is_degraded();
        let summary = match summarized.result {
            OperationResult::Summary { text } => text,
            _ => String::new(),
        };

        Ok(TriageReport {
            email_id,
            category,
            actions,
            summary,
            degraded,
        })
    }

    /// Triage every email in the inbox concurrently, in id order.
    pub async fn triage_all(&self) -> Vec<Result<TriageReport, OperationFailure>> {
        let ids = self.inbox.ids();
        info!(count = ids.len(), "Triaging inbox");
        join_all(ids.into_iter().map(|id| self.triage(id))).await
    }

    /// Category counts over stored results.
    pub async fn inbox_stats(&self) -> InboxStats {
        let by_label = self.results.category_counts().await;
        let total = self.inbox.len();
        let categorized: usize = by_label.values().sum();
        InboxStats {
            total,
            categorized,
            uncategorized: total.saturating_sub(categorized),
            by_label,
            pending_drafts: self.drafts.pending_count().await,
        }
    }
}
