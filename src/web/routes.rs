//! REST endpoints for sessions, chat, and hazard uploads.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SessionError;
use crate::session::SessionController;

/// Browser UI, embedded at compile time.
const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Largest accepted upload.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Multipart field carrying the spreadsheet.
const UPLOAD_FIELD: &str = "file";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SessionController>,
}

/// Build the Axum router with the UI page and JSON API.
pub fn app_routes(controller: Arc<SessionController>) -> Router {
    let state = AppState { controller };

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/assistants", get(list_assistants))
        .route("/api/sessions", post(start_session))
        .route("/api/sessions/{id}", get(get_session).delete(end_session))
        .route("/api/sessions/{id}/credential", put(set_credential))
        .route("/api/sessions/{id}/active", put(select_assistant))
        .route("/api/sessions/{id}/conversations/{assistant}", get(history))
        .route("/api/sessions/{id}/messages", post(send_message))
        .route("/api/sessions/{id}/upload", post(upload))
        .route("/api/sessions/{id}/hazards/{index}", get(preview_hazard))
        .route("/api/sessions/{id}/hazards/{index}/submit", post(submit_hazard))
        .layer(axum::extract::DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────────

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = match &self {
            SessionError::CredentialMissing => StatusCode::UNAUTHORIZED,
            SessionError::NotFound(_) | SessionError::UnknownAssistant(_) => StatusCode::NOT_FOUND,
            SessionError::NoUpload => StatusCode::CONFLICT,
            SessionError::EmptyContent => StatusCode::BAD_REQUEST,
            SessionError::Extract(crate::error::ExtractError::Parse { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            SessionError::Extract(crate::error::ExtractError::Index { .. }) => {
                StatusCode::BAD_REQUEST
            }
            SessionError::Invocation(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message.into()})),
    )
        .into_response()
}

// ── Page / Health ───────────────────────────────────────────────────────

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "riskradar"
    }))
}

async fn list_assistants(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.directory().profiles().to_vec())
}

// ── Sessions ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StartSessionRequest {
    #[serde(default)]
    api_key: Option<String>,
}

/// The body is optional; an empty or unparsable one starts a session
/// without a credential.
async fn start_session(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let api_key = serde_json::from_slice::<StartSessionRequest>(&body)
        .ok()
        .and_then(|b| b.api_key);
    let view = state.controller.start_session(api_key).await;
    (StatusCode::CREATED, Json(view))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, SessionError> {
    Ok(Json(state.controller.view(id).await?))
}

async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, SessionError> {
    state.controller.end_session(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct CredentialRequest {
    api_key: String,
}

async fn set_credential(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CredentialRequest>,
) -> Result<impl IntoResponse, SessionError> {
    Ok(Json(state.controller.set_credential(id, body.api_key).await?))
}

#[derive(Deserialize)]
struct SelectRequest {
    assistant: String,
}

async fn select_assistant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SelectRequest>,
) -> Result<impl IntoResponse, SessionError> {
    Ok(Json(
        state.controller.select_assistant(id, &body.assistant).await?,
    ))
}

// ── Chat ────────────────────────────────────────────────────────────────

async fn history(
    State(state): State<AppState>,
    Path((id, assistant)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, SessionError> {
    Ok(Json(state.controller.history(id, &assistant).await?))
}

#[derive(Deserialize)]
struct MessageRequest {
    content: String,
    /// Switch to this assistant before sending.
    #[serde(default)]
    assistant: Option<String>,
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<MessageRequest>,
) -> Result<impl IntoResponse, SessionError> {
    if let Some(assistant) = body.assistant.as_deref() {
        state.controller.select_assistant(id, assistant).await?;
    }
    let turns = state.controller.send_message(id, &body.content).await?;
    Ok(Json(serde_json::json!({ "appended": turns })))
}

// ── Hazards ─────────────────────────────────────────────────────────────

async fn upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Response {
    // The file is the `file` part, or failing that the first part with a file name.
    let (file_name, bytes) = loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return bad_request("No file in upload"),
            Err(e) => {
                warn!(session_id = %id, error = %e, "Malformed multipart upload");
                return bad_request(format!("Malformed upload: {e}"));
            }
        };
        if field.name() != Some(UPLOAD_FIELD) && field.file_name().is_none() {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        match field.bytes().await {
            Ok(bytes) => break (file_name, bytes),
            Err(e) => return bad_request(format!("Failed to read upload: {e}")),
        }
    };
    debug!(session_id = %id, size = bytes.len(), "Upload received");

    match state
        .controller
        .upload(id, file_name.as_deref(), &bytes)
        .await
    {
        Ok(table) => Json(table).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn preview_hazard(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<impl IntoResponse, SessionError> {
    let text = state.controller.preview_hazard(id, index).await?;
    Ok(Json(serde_json::json!({ "index": index, "text": text })))
}

async fn submit_hazard(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<impl IntoResponse, SessionError> {
    let turns = state.controller.submit_hazard(id, index).await?;
    Ok(Json(serde_json::json!({ "appended": turns })))
}
