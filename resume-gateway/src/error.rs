//! HTTP-facing errors.
//!
//! Every failure reaches the client as `{"error": ..., "code": ...}`. The
//! `error` text keeps the human-readable wording of each endpoint; `code`
//! tells the failure causes apart.

use crate::document::ExtractionError;
use crate::provider::ProviderError;
use crate::session::SessionError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use resume_common::util::sanitize_for_log;
use serde::{Deserialize, Serialize};

/// Endpoint a failure happened in; selects the message prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Chat,
    UploadResume,
    ClearChat,
    Index,
}

impl Operation {
    fn prefix(self) -> &'static str {
        match self {
            Operation::Chat => "Error processing request",
            Operation::UploadResume => "Error processing resume",
            Operation::ClearChat => "Error clearing session",
            Operation::Index => "Error rendering page",
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Handler failure.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or missing input
    #[error("{0}")]
    BadRequest(String),

    /// Upload is not a PDF
    #[error("Only PDF files are supported")]
    UnsupportedMediaType,

    /// Request body exceeds the configured limit
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Uploaded bytes could not be read as a document
    #[error("{op_prefix}: {source}", op_prefix = .op.prefix())]
    Extraction {
        op: Operation,
        #[source]
        source: ExtractionError,
    },

    /// The model call failed
    #[error("{op_prefix}: {source}", op_prefix = .op.prefix())]
    Provider {
        op: Operation,
        #[source]
        source: ProviderError,
    },

    /// The resume was analysed but the chat thread could not be told about it
    #[error("{op_prefix}: resume analysed but chat context update failed: {source}", op_prefix = .op.prefix())]
    ContextSync {
        op: Operation,
        #[source]
        source: ProviderError,
    },

    /// Session store failure
    #[error("{op_prefix}: {source}", op_prefix = .op.prefix())]
    Session {
        op: Operation,
        #[source]
        source: SessionError,
    },

    /// Anything else on the server side
    #[error("{op_prefix}: {source}", op_prefix = .op.prefix())]
    Internal {
        op: Operation,
        #[source]
        source: resume_common::Error,
    },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn provider(op: Operation, source: ProviderError) -> Self {
        Self::Provider { op, source }
    }

    pub fn session(op: Operation, source: SessionError) -> Self {
        Self::Session { op, source }
    }

    /// HTTP status and machine-readable code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::UnsupportedMediaType => (StatusCode::BAD_REQUEST, "UNSUPPORTED_MEDIA_TYPE"),
            ApiError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            ApiError::Extraction { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "EXTRACTION_FAILED")
            }
            ApiError::Provider { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "PROVIDER_ERROR"),
            ApiError::ContextSync { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONTEXT_SYNC_FAILED")
            }
            ApiError::Session { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "SESSION_ERROR"),
            ApiError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(code, error = %sanitize_for_log(&message), "Request failed");
        } else {
            tracing::debug!(code, error = %message, "Request rejected");
        }

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
