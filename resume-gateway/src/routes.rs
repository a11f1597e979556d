//! HTTP routes for the resume chat gateway.
//!
//! - `GET /` - chat page
//! - `POST /chat` - one chat turn against a session
//! - `POST /upload-resume` - analyse a PDF resume and prime the chat session
//! - `POST /clear-chat` - forget a session
//! - `GET /health` - liveness
//! - `GET /static/*` - front-end assets

use crate::conversation::ChatModel;
use crate::document::{is_pdf_filename, PdfTextExtractor, TextExtractor};
use crate::error::{ApiError, Operation};
use crate::pages::Pages;
use crate::provider::{Message, Provider};
use crate::session::SessionStore;
use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::BytesRejection,
        DefaultBodyLimit, FromRequest, Multipart, Request, State,
    },
    http::{header, StatusCode},
    response::Html,
    routing::{get, post},
    Form, Json, Router,
};
use resume_common::config::{Config, WebConfig};
use resume_common::util::truncate_with_ellipsis;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tower_http::services::ServeDir;

const UPLOAD_SUCCESS: &str = "Resume uploaded and analyzed successfully";
const CLEARED: &str = "Chat session cleared successfully";
const NOTHING_TO_CLEAR: &str = "No session found to clear";

/// Largest body read when `/clear-chat` is sent without a form encoding.
const CLEAR_BODY_LIMIT: usize = 64 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub extractor: Arc<dyn TextExtractor>,
    pub pages: Arc<Pages>,
    pub default_session_id: Arc<str>,
}

impl AppState {
    pub fn new(
        sessions: Arc<SessionStore>,
        extractor: Arc<dyn TextExtractor>,
        pages: Pages,
        default_session_id: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            sessions,
            extractor,
            pages: Arc::new(pages),
            default_session_id: default_session_id.into(),
        }
    }

    /// Production state: PDF extraction and conversations against `provider`.
    pub fn from_config(config: &Config, provider: Arc<dyn Provider>) -> resume_common::Result<Self> {
        let model = ChatModel::new(provider, &config.llm);
        let sessions = Arc::new(SessionStore::new(model, &config.sessions));

        Ok(Self::new(
            sessions,
            Arc::new(PdfTextExtractor),
            Pages::new("/static")?,
            config.sessions.default_session_id.as_str(),
        ))
    }

    /// The requested session id, or the default when absent or empty.
    ///
    /// Ids are used verbatim: `" s1"` and `"s1"` are different sessions.
    pub fn session_id(&self, requested: Option<String>) -> String {
        requested
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.default_session_id.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

/// Body of `POST /chat`.
#[derive(Debug, Deserialize)]
pub struct ChatPayload {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadReply {
    pub message: String,
    pub filename: String,
    pub analysis: String,
}

/// Form body of `POST /clear-chat`.
#[derive(Debug, Deserialize)]
pub struct ClearChatForm {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearReply {
    pub message: String,
    /// Whether any conversation was removed.
    pub cleared: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Prompts
// ─────────────────────────────────────────────────────────────────────────────

/// Prompt sent to the resume thread with the extracted text.
pub fn analysis_prompt(resume_text: &str) -> String {
    format!(
        "I'm sharing my resume text with you. Please analyze it and provide insights:\n\n\
         {resume_text}\n\n\
         Please analyze this resume and provide a brief summary of my skills and experience."
    )
}

/// Note sent to the chat thread after a resume was analysed.
pub fn context_message(filename: &str) -> String {
    format!(
        "I've analyzed a resume titled {filename}. It contains information about skills and \
         experiences. I'll use this for future conversations."
    )
}

/// Multipart read failure. Size-limit violations keep their 413.
fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::bad_request(format!("Invalid multipart body: {}", e.body_text()))
    }
}

/// Content of the last user message, if it has any.
fn select_prompt(messages: &[Message]) -> Result<&str, ApiError> {
    if messages.is_empty() {
        return Err(ApiError::bad_request("No messages provided"));
    }

    messages
        .iter()
        .rev()
        .find(|m| m.is_user())
        .map(|m| m.content.as_str())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| ApiError::bad_request("No user message found"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Router Builders
// ─────────────────────────────────────────────────────────────────────────────

/// Application routes: page, chat, upload, clear.
pub fn build_routes(state: AppState, web: &WebConfig) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/chat", post(chat_handler))
        .route(
            "/upload-resume",
            post(upload_resume_handler).layer(DefaultBodyLimit::max(web.max_upload_bytes)),
        )
        .route("/clear-chat", post(clear_chat_handler))
        .with_state(state)
}

pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_handler))
}

/// Serve `dir` under `/static`. Empty when the directory does not exist.
pub fn static_routes(dir: &Path) -> Router {
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "Static directory not found, assets disabled");
        return Router::new();
    }

    tracing::info!(dir = %dir.display(), "Serving static assets");
    Router::new().nest_service("/static", ServeDir::new(dir))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    state
        .pages
        .index()
        .map(Html)
        .map_err(|source| ApiError::Internal {
            op: Operation::Index,
            source,
        })
}

/// Parse a chat body as JSON whatever its `Content-Type` says.
fn parse_chat_payload(body: &[u8]) -> Result<ChatPayload, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {e}")))
}

async fn chat_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let body = body.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(e.body_text())
        } else {
            ApiError::bad_request(e.body_text())
        }
    })?;
    let payload = parse_chat_payload(&body)?;

    let prompt = select_prompt(&payload.messages)?;
    let session_id = state.session_id(payload.session_id);

    tracing::info!(
        session = %session_id,
        prompt = %truncate_with_ellipsis(prompt, 80),
        "Chat turn"
    );

    let handle = state
        .sessions
        .get_or_create(&session_id)
        .map_err(|e| ApiError::session(Operation::Chat, e))?;

    let response = handle
        .lock()
        .await
        .send_message(prompt)
        .await
        .map_err(|e| ApiError::provider(Operation::Chat, e))?;

    Ok(Json(ChatReply { response }))
}

/// Uploaded resume pulled out of the multipart body.
struct ResumeUpload {
    filename: String,
    bytes: Vec<u8>,
    session_id: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<ResumeUpload, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut session_id = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                if filename.is_empty() {
                    return Err(ApiError::bad_request("No file uploaded"));
                }
                if !is_pdf_filename(&filename) {
                    return Err(ApiError::UnsupportedMediaType);
                }
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((filename, bytes.to_vec()));
            }
            Some("session_id") => {
                let value = field.text().await.map_err(multipart_error)?;
                session_id = Some(value);
            }
            _ => {}
        }
    }

    let (filename, bytes) = file.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;
    Ok(ResumeUpload {
        filename,
        bytes,
        session_id,
    })
}

async fn upload_resume_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadReply>, ApiError> {
    const OP: Operation = Operation::UploadResume;

    let multipart = multipart
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e.body_text())))?;
    let upload = read_upload(multipart).await?;
    let session_id = state.session_id(upload.session_id);

    tracing::info!(
        session = %session_id,
        filename = %upload.filename,
        bytes = upload.bytes.len(),
        "Resume uploaded"
    );

    let text = state
        .extractor
        .extract(upload.bytes)
        .await
        .map_err(|source| ApiError::Extraction { op: OP, source })?;

    if text.trim().is_empty() {
        tracing::warn!(session = %session_id, "No text extracted from resume");
    }

    let resume_thread = state
        .sessions
        .get_or_create(&state.sessions.resume_key(&session_id))
        .map_err(|e| ApiError::session(OP, e))?;
    let analysis = resume_thread
        .lock()
        .await
        .send_message(analysis_prompt(&text))
        .await
        .map_err(|e| ApiError::provider(OP, e))?;

    let chat_thread = state
        .sessions
        .get_or_create(&session_id)
        .map_err(|e| ApiError::session(OP, e))?;
    chat_thread
        .lock()
        .await
        .send_message(context_message(&upload.filename))
        .await
        .map_err(|source| ApiError::ContextSync { op: OP, source })?;

    Ok(Json(UploadReply {
        message: UPLOAD_SUCCESS.into(),
        filename: upload.filename,
        analysis,
    }))
}

/// The `session_id` field of a clear request.
///
/// Accepts url-encoded and multipart forms. A request without a body, or a
/// form without the field, yields `None`. A body that cannot be read as
/// either form is rejected.
async fn read_clear_session_id(
    request: Request,
    state: &AppState,
) -> Result<Option<String>, ApiError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, state).await.map_err(|e| {
            ApiError::bad_request(format!("Invalid multipart body: {}", e.body_text()))
        })?;

        let mut session_id = None;
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            if field.name() == Some("session_id") {
                session_id = Some(field.text().await.map_err(multipart_error)?);
            }
        }
        return Ok(session_id);
    }

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(form) = Form::<ClearChatForm>::from_request(request, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid form body: {}", e.body_text())))?;
        return Ok(form.session_id);
    }

    let body = axum::body::to_bytes(request.into_body(), CLEAR_BODY_LIMIT)
        .await
        .map_err(|e| ApiError::bad_request(format!("Unreadable request body: {e}")))?;
    if body.is_empty() {
        return Ok(None);
    }
    Err(ApiError::bad_request(
        "Expected an application/x-www-form-urlencoded or multipart/form-data body",
    ))
}

async fn clear_chat_handler(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<ClearReply>, ApiError> {
    let requested = read_clear_session_id(request, &state).await?;
    let session_id = state.session_id(requested);

    let outcome = state
        .sessions
        .delete_session(&session_id)
        .map_err(|e| ApiError::session(Operation::ClearChat, e))?;

    let message = if outcome.any() { CLEARED } else { NOTHING_TO_CLEAR };
    Ok(Json(ClearReply {
        message: message.into(),
        cleared: outcome.any(),
    }))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: "resume-gateway".into(),
    })
}
