//! Web chat server.
//!
//! Serves a single-page chat UI and the JSON API behind it. Every browser
//! tab starts its own session; history and the password flag live in that
//! session only.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Chat page |
//! | `POST` | `/api/session` | Start a session |
//! | `POST` | `/api/login` | Unlock a session with the app password |
//! | `GET`  | `/api/history/{id}` | Chat history of a session |
//! | `POST` | `/api/chat` | Ask a question |
//! | `POST` | `/api/reset` | Clear a session's history |
//! | `GET`  | `/health` | Health check (version, live session count) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `busy` (409), `internal` (500).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::assistant::Assistant;
use crate::config::Config;
use crate::models::ChatTurn;
use crate::session::{SessionError, SessionStore};

const INDEX_HTML: &str = include_str!("chat.html");

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    assistant: Arc<Assistant>,
    sessions: SessionStore,
}

impl AppState {
    pub fn new(config: Config, assistant: Assistant) -> Self {
        let sessions = SessionStore::new(
            config.server.password.is_some(),
            Duration::from_secs(config.server.session_idle_secs),
            config.server.max_sessions,
        );
        Self {
            config: Arc::new(config),
            assistant: Arc::new(assistant),
            sessions,
        }
    }
}

/// Build the router for `state`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/api/session", post(handle_create_session))
        .route("/api/login", post(handle_login))
        .route("/api/history/{id}", get(handle_history))
        .route("/api/chat", post(handle_chat))
        .route("/api/reset", post(handle_reset))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the chat server on `[server].bind` and run until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let assistant = Assistant::from_config(config)?;
    let state = AppState::new(config.clone(), assistant);

    if config.server.password.is_none() {
        tracing::warn!("no APP_PASSWORD configured; the chat UI is open to anyone who can reach it");
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("chat UI listening on http://{}", bind_addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn unauthorized() -> AppError {
    AppError::new(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "password required",
    )
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound => {
                AppError::new(StatusCode::NOT_FOUND, "not_found", "unknown session")
            }
            SessionError::Busy => AppError::new(
                StatusCode::CONFLICT,
                "busy",
                "a question is already being answered in this session",
            ),
        }
    }
}

// ============ Handlers ============

async fn handle_index(State(state): State<AppState>) -> Html<String> {
    Html(INDEX_HTML.replace("{{title}}", &escape_html(&state.config.server.title)))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub requires_password: bool,
}

async fn handle_create_session(State(state): State<AppState>) -> Json<SessionResponse> {
    Json(SessionResponse {
        session_id: state.sessions.create(),
        requires_password: state.sessions.password_required(),
    })
}

#[derive(Deserialize)]
struct LoginRequest {
    session_id: String,
    password: String,
}

async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<StatusCode, AppError> {
    let mut session = state.sessions.acquire(&req.session_id).await?;
    if session.authenticate(state.config.server.password.as_deref(), &req.password) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        tracing::info!(session = %req.session_id, "incorrect password");
        Err(AppError::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "incorrect password",
        ))
    }
}

#[derive(Serialize, Deserialize)]
pub struct HistoryResponse {
    pub turns: Vec<ChatTurn>,
}

async fn handle_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let session = state.sessions.acquire(&id).await?;
    if !session.is_authenticated() {
        return Err(unauthorized());
    }
    Ok(Json(HistoryResponse {
        turns: session.turns().to_vec(),
    }))
}

#[derive(Deserialize)]
struct ChatRequest {
    session_id: String,
    question: String,
}

#[derive(Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub turns: Vec<ChatTurn>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let mut session = state.sessions.try_acquire(&req.session_id)?;
    if !session.is_authenticated() {
        return Err(unauthorized());
    }
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let turn = state
        .assistant
        .respond(&mut session, &req.question)
        .await
        .map_err(|e| AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string()))?;

    Ok(Json(ChatResponse {
        answer: turn.content,
        turns: session.turns().to_vec(),
    }))
}

#[derive(Deserialize)]
struct ResetRequest {
    session_id: String,
}

async fn handle_reset(
    State(state): State<AppState>,
    Json(req): Json<ResetRequest>,
) -> Result<StatusCode, AppError> {
    let mut session = state.sessions.try_acquire(&req.session_id)?;
    if !session.is_authenticated() {
        return Err(unauthorized());
    }
    session.reset();
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    sessions: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.sessions.active_sessions(),
    })
}
