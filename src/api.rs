//! REST endpoints for the inbox UI.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::error::{OperationFailure, TemplateError};
use crate::inbox::{Email, EmailId};
use crate::pipeline::Orchestrator;
use crate::pipeline::types::{
    CategoryResult, ChatTurn, ExtraContext, OperationRequest, OperationResult,
};
use crate::templates::OperationKind;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Build the Axum router for the inbox API.
pub fn api_routes(orchestrator: Arc<Orchestrator>) -> Router {
    let state = AppState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/emails", get(list_emails))
        .route("/api/emails/{id}/results", get(email_results))
        .route("/api/emails/{id}/operations", post(run_operation))
        .route("/api/emails/{id}/triage", post(triage_email))
        .route("/api/templates", get(list_templates))
        .route("/api/templates/reset", post(reset_templates))
        .route("/api/templates/{kind}", get(get_template).put(save_template))
        .route("/api/drafts", get(list_drafts))
        .route("/api/stats", get(stats))
        .route("/api/search", get(search))
        .route("/api/actions", get(list_actions))
        .route("/api/urgent", get(list_urgent))
        .route("/api/overview", get(overview))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────────

/// Error responses. Every variant renders as a JSON object with an
/// `error` code and a human-readable `message`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    EmailNotFound(EmailId),
    Operation(OperationFailure),
    Template(TemplateError),
}

impl From<OperationFailure> for ApiError {
    fn from(e: OperationFailure) -> Self {
        Self::Operation(e)
    }
}

impl From<TemplateError> for ApiError {
    fn from(e: TemplateError) -> Self {
        Self::Template(e)
    }
}

fn status_for_code(code: &str) -> StatusCode {
    match code {
        "email_not_found" | "template_not_found" => StatusCode::NOT_FOUND,
        "template_invalid" | "placeholder_missing" | "empty_model_response"
        | "incomplete_draft" => StatusCode::UNPROCESSABLE_ENTITY,
        "model_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        "cancelled" => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn template_code(e: &TemplateError) -> &'static str {
    match e {
        TemplateError::NotFound { .. } => "template_not_found",
        TemplateError::Invalid { .. } => "template_invalid",
        TemplateError::Persistence { .. } => "template_persistence",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "bad_request", "message": message})),
            )
                .into_response(),
            Self::EmailNotFound(id) => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": "email_not_found",
                    "message": format!("Email {id} not found"),
                    "email_id": id,
                })),
            )
                .into_response(),
            Self::Operation(failure) => {
                let code = failure.code();
                (
                    status_for_code(code),
                    Json(json!({
                        "error": code,
                        "message": failure.error.to_string(),
                        "stage": failure.stage,
                        "operation": failure.kind,
                        "email_id": failure.email_id,
                    })),
                )
                    .into_response()
            }
            Self::Template(e) => {
                let code = template_code(&e);
                if matches!(e, TemplateError::Persistence { .. }) {
                    warn!(error = %e, "Template store write failed");
                }
                let mut body = json!({"error": code, "message": e.to_string()});
                if let TemplateError::Invalid { missing, .. } = &e {
                    body["missing"] = json!(missing);
                }
                (status_for_code(code), Json(body)).into_response()
            }
        }
    }
}

fn parse_email_id(raw: &str) -> Result<EmailId, ApiError> {
    raw.parse::<u32>()
        .map(EmailId)
        .map_err(|_| ApiError::BadRequest(format!("Invalid email id: {raw}")))
}

fn parse_kind(raw: &str) -> Result<OperationKind, ApiError> {
    raw.parse::<OperationKind>().map_err(ApiError::BadRequest)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Emails & operations ─────────────────────────────────────────────────

#[derive(Serialize)]
struct EmailView {
    #[serde(flatten)]
    email: Email,
    category: Option<CategoryResult>,
}

async fn list_emails(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = &state.orchestrator;
    let mut views = Vec::new();
    for email in orchestrator.inbox().list() {
        let category = orchestrator
            .results()
            .get(email.id, OperationKind::Categorize)
            .await
            .and_then(|p| match p.result {
                OperationResult::Category(c) => Some(c),
                _ => None,
            });
        views.push(EmailView {
            email: email.clone(),
            category,
        });
    }
    Json(views)
}

async fn email_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let email_id = parse_email_id(&id)?;
    let details = state
        .orchestrator
        .email_details(email_id)
        .await
        .ok_or(ApiError::EmailNotFound(email_id))?;
    Ok(Json(details))
}

#[derive(Deserialize)]
struct OperationBody {
    operation: String,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    history: Vec<ChatTurn>,
}

async fn run_operation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<OperationBody>,
) -> Result<impl IntoResponse, ApiError> {
    let email_id = parse_email_id(&id)?;
    let kind = parse_kind(&body.operation)?;
    let request = OperationRequest::new(email_id, kind).with_context(ExtraContext {
        history: body.history,
        question: body.question,
    });
    let processed = state.orchestrator.process(request).await?;
    Ok(Json(processed))
}

async fn triage_email(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let email_id = parse_email_id(&id)?;
    let report = state.orchestrator.triage(email_id).await?;
    Ok(Json(report))
}

// ── Templates ───────────────────────────────────────────────────────────

async fn list_templates(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.templates().list().await)
}

async fn get_template(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(state.orchestrator.templates().get(kind).await?))
}

#[derive(Deserialize)]
struct SaveTemplateBody {
    text: String,
}

async fn save_template(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(body): Json<SaveTemplateBody>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let saved = state.orchestrator.templates().save(kind, body.text).await?;
    Ok(Json(saved))
}

async fn reset_templates(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.orchestrator.templates().reset_to_defaults().await?))
}

// ── Drafts & stats ──────────────────────────────────────────────────────

async fn list_drafts(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.drafts().list().await)
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.inbox_stats().await)
}

// ── Inbox views ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    Json(state.orchestrator.search(&params.q).await)
}

async fn list_actions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.all_actions().await)
}

async fn list_urgent(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.urgent().await)
}

async fn overview(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.overview().await)
}
