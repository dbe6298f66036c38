//! HTTP server exposing per-session PDF chat.
//!
//! Each client creates a session, uploads PDFs into it once, then asks
//! questions. Sessions are independent and live in memory until deleted or
//! the process exits.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/sessions` | Create a session, returns `{id}` |
//! | `GET`    | `/sessions/{id}` | Session status |
//! | `DELETE` | `/sessions/{id}` | Discard a session |
//! | `POST`   | `/sessions/{id}/documents` | Upload base64-encoded PDFs |
//! | `POST`   | `/sessions/{id}/chat` | Ask a question |
//! | `GET`    | `/sessions/{id}/messages` | Chat history |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `extraction_failed` (422), `index_failed` (422), `internal` (500).
//!
//! A failed completion call is not an error here: the chat endpoint returns
//! 200 with the fallback reply, exactly as it is recorded in the history.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can be served from anywhere.

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use pdfchat_core::models::{ChatMessage, UploadedDocument};

use crate::config::Config;
use crate::session::{
    Pipeline, Session, SessionError, SessionRegistry, SessionStatus, UploadOutcome,
};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            sessions: Arc::new(SessionRegistry::new(pipeline)),
        }
    }

    async fn session(&self, id: Uuid) -> Result<Arc<tokio::sync::Mutex<Session>>, AppError> {
        self.sessions
            .get(id)
            .await
            .ok_or_else(|| not_found(format!("no session with id: {}", id)))
    }
}

/// Build the router. Split from [`run_server`] so tests can bind their own listener.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/sessions", post(handle_create_session))
        .route(
            "/sessions/{id}",
            get(handle_session_status).delete(handle_delete_session),
        )
        .route("/sessions/{id}/documents", post(handle_upload))
        .route("/sessions/{id}/chat", post(handle_chat))
        .route("/sessions/{id}/messages", get(handle_messages))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Binds to `[server].bind` and runs until the process is terminated.
/// Fails early if no completion API key is configured.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(Pipeline::from_config(config)?);
    let app = router(
        AppState::new(pipeline),
        config.server.max_body_mb * 1024 * 1024,
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    println!("PDF chat server listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
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
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let (status, code) = match &err {
            SessionError::EmptyQuery => (StatusCode::BAD_REQUEST, "bad_request"),
            SessionError::Extraction(_) => (StatusCode::UNPROCESSABLE_ENTITY, "extraction_failed"),
            SessionError::IndexBuild(_) => (StatusCode::UNPROCESSABLE_ENTITY, "index_failed"),
            SessionError::Embedding(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /sessions ============

#[derive(Serialize)]
struct CreatedResponse {
    id: Uuid,
}

async fn handle_create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<CreatedResponse>) {
    let id = state.sessions.create().await;
    (StatusCode::CREATED, Json(CreatedResponse { id }))
}

async fn handle_session_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionStatus>, AppError> {
    let session = state.session(id).await?;
    let status = session.lock().await.status();
    Ok(Json(status))
}

async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.sessions.remove(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("no session with id: {}", id)))
    }
}

// ============ POST /sessions/{id}/documents ============

#[derive(Deserialize)]
struct UploadRequest {
    files: Vec<UploadFile>,
}

#[derive(Deserialize)]
struct UploadFile {
    filename: String,
    content_base64: String,
}

/// Handler for `POST /sessions/{id}/documents`.
///
/// Decodes every file before touching the session, so a bad encoding is a
/// 400 and leaves the session as it was. Uploads to a session that already
/// has an index return `{"outcome": "already_processed"}`.
async fn handle_upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadOutcome>, AppError> {
    let session = state.session(id).await?;

    let mut docs = Vec::with_capacity(req.files.len());
    for file in req.files {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(file.content_base64.trim())
            .map_err(|e| bad_request(format!("{}: invalid base64: {}", file.filename, e)))?;
        docs.push(UploadedDocument::new(file.filename, bytes));
    }

    let outcome = session.lock().await.process_uploads(docs).await?;
    Ok(Json(outcome))
}

// ============ POST /sessions/{id}/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
    messages: Vec<ChatMessage>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let session = state.session(id).await?;
    let mut session = session.lock().await;
    let reply = session.ask(&req.message).await?;
    Ok(Json(ChatResponse {
        reply,
        messages: session.messages().to_vec(),
    }))
}

// ============ GET /sessions/{id}/messages ============

#[derive(Serialize)]
struct MessagesResponse {
    messages: Vec<ChatMessage>,
}

async fn handle_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessagesResponse>, AppError> {
    let session = state.session(id).await?;
    let messages = session.lock().await.messages().to_vec();
    Ok(Json(MessagesResponse { messages }))
}
