//! REST API endpoint handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rolechat::ConfigError;
use rolechat::config::{ChatSettings, GenerationParams, ModelName};
use rolechat::demo::{self, WidgetForm};
use rolechat::model::ModelService;
use rolechat::session::{Page, Session, Turn};
use rolechat::turn::{submit, submit_echo};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::sessions::{SessionRef, SessionRegistry};
use crate::snapshot::{PageInfo, SessionSnapshot};

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub service: Arc<dyn ModelService>,
    /// Used when a chat request carries no API key of its own.
    pub default_api_key: Option<String>,
}

impl AppState {
    /// Evict idle sessions and release their cached models.
    pub fn sweep_idle(&self) -> usize {
        let evicted = self.sessions.evict_idle();
        for session in &evicted {
            // An idle session is unlocked; a locked one is mid-turn and its
            // key is released when a later reseed replaces it.
            if let Ok(session) = session.try_lock() {
                release_handle(self.service.as_ref(), &session);
            }
        }
        if !evicted.is_empty() {
            info!("Evicted {} idle sessions", evicted.len());
        }
        evicted.len()
    }
}

fn release_handle(service: &dyn ModelService, session: &Session) {
    if let Some(key) = session.handle_key() {
        service.release(key);
    }
}

// ── Errors ──

pub enum ApiError {
    SessionNotFound(String),
    Config(ConfigError),
    WrongPage { expected: Page, actual: Page },
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        ApiError::Config(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::SessionNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("no session with id {id}"))
            }
            ApiError::Config(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::WrongPage { expected, actual } => (
                StatusCode::BAD_REQUEST,
                format!("this endpoint needs a {expected} session, not {actual}"),
            ),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

fn find(app: &AppState, id: &str) -> Result<SessionRef, ApiError> {
    app.sessions
        .get(id)
        .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))
}

// ── Pages ──

/// GET /api/pages — Page titles, menus, parameter ranges and defaults.
pub async fn get_pages() -> Json<Vec<PageInfo>> {
    Json(PageInfo::all())
}

// ── Session lifecycle ──

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub page: String,
}

#[derive(Serialize)]
pub struct CreateSessionResponse {
    pub id: String,
    pub page: Page,
}

/// POST /api/sessions — Start a session for a page.
pub async fn create_session(
    State(app): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let page = Page::parse(&body.page)?;
    app.sweep_idle();
    let id = app.sessions.create(page);
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { id, page })))
}

#[derive(Deserialize, Default)]
pub struct SnapshotQuery {
    /// Count this request as a page load.
    #[serde(default)]
    pub visit: bool,
}

/// GET /api/sessions/{id} — Session snapshot.
pub async fn get_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = find(&app, &id)?;
    let mut session = session.lock().await;
    if query.visit {
        session.record_visit();
    }
    Ok(Json(SessionSnapshot::from_session(&session)))
}

/// DELETE /api/sessions/{id} — End a session.
pub async fn delete_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session = app
        .sessions
        .remove(&id)
        .ok_or(ApiError::SessionNotFound(id))?;
    release_handle(app.service.as_ref(), &*session.lock().await);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sessions/{id}/reset — Clear the transcript and conversation.
pub async fn reset_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session = find(&app, &id)?;
    let mut session = session.lock().await;
    release_handle(app.service.as_ref(), &session);
    session.reset();
    debug!("Session {id} reset");
    Ok(StatusCode::NO_CONTENT)
}

// ── Chat ──

/// Request body for POST /api/sessions/{id}/chat.
#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub params: Option<GenerationParams>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub turn: Turn,
    pub turns: Vec<Turn>,
}

/// POST /api/sessions/{id}/chat — Submit one chat message.
///
/// Returns the assistant turn and the full transcript. Configuration
/// problems are 400 and leave the transcript untouched.
pub async fn post_chat(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session = find(&app, &id)?;
    let mut session = session.lock().await;
    let page = session.page();

    let role = page.resolve_role(body.role.as_deref(), body.instruction.as_deref())?;
    let model = match body.model.as_deref() {
        Some(name) => ModelName::parse(name)?,
        None => page.models().first().copied().unwrap_or_default(),
    };
    let api_key = body
        .api_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| app.default_api_key.clone())
        .unwrap_or_default();
    let settings = ChatSettings::new(api_key, model)
        .with_params(body.params.unwrap_or_default())
        .with_allowed_models(page.models());

    let turn = submit(
        &mut session,
        &role,
        &body.message,
        &settings,
        app.service.as_ref(),
    )
    .await?;

    Ok(Json(ChatResponse {
        turn,
        turns: session.history().to_vec(),
    }))
}

// ── Widgets page ──

#[derive(Deserialize)]
pub struct WidgetsRequest {
    #[serde(default)]
    pub form: WidgetForm,
}

#[derive(Serialize)]
pub struct WidgetsResponse {
    pub summary: String,
    pub byte_len: usize,
}

/// POST /api/sessions/{id}/widgets — Summarize the widget form.
pub async fn post_widgets(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<WidgetsRequest>,
) -> Result<Json<WidgetsResponse>, ApiError> {
    let session = find(&app, &id)?;
    require_page(session.lock().await.page(), Page::Widgets)?;

    body.form.validate()?;
    let summary = body.form.summary();
    let byte_len = demo::byte_len(&summary);
    Ok(Json(WidgetsResponse { summary, byte_len }))
}

#[derive(Deserialize)]
pub struct EchoRequest {
    pub message: String,
    #[serde(default = "default_confidence")]
    pub confidence: u32,
}

fn default_confidence() -> u32 {
    WidgetForm::default().confidence
}

/// POST /api/sessions/{id}/echo — Widgets page echo chat.
pub async fn post_echo(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<EchoRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session = find(&app, &id)?;
    let mut session = session.lock().await;
    require_page(session.page(), Page::Widgets)?;

    let turn = submit_echo(&mut session, &body.message, body.confidence)?;
    Ok(Json(ChatResponse {
        turn,
        turns: session.history().to_vec(),
    }))
}

fn require_page(actual: Page, expected: Page) -> Result<(), ApiError> {
    if actual == expected {
        Ok(())
    } else {
        Err(ApiError::WrongPage { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_deserializes_minimal_body() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(req.message, "hi");
        assert!(req.api_key.is_none());
        assert!(req.params.is_none());
    }

    #[test]
    fn chat_request_deserializes_partial_params() {
        let json = r#"{"message":"hi","model":"gemini-1.5-pro","params":{"temperature":1.2}}"#;
        let req: ChatRequest = serde_json::from_str(json).unwrap();
        let params = req.params.unwrap();
        assert!((params.temperature - 1.2).abs() < f32::EPSILON);
        assert_eq!(params.top_k, 40);
    }

    #[test]
    fn echo_request_defaults_confidence() {
        let req: EchoRequest = serde_json::from_str(r#"{"message":"yo"}"#).unwrap();
        assert_eq!(req.confidence, 70);
    }

    #[test]
    fn config_errors_are_bad_requests() {
        let resp = ApiError::from(ConfigError::MissingApiKey).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = ApiError::SessionNotFound("x".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
