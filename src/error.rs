// Error handling module
// Defines error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API errors that can occur during request processing
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error from the OpenAI API
    #[error("OpenAI API error: {status} - {message}")]
    OpenAiError { status: u16, message: String },

    /// Error from the Pinecone API
    #[error("Pinecone API error: {status} - {message}")]
    PineconeError { status: u16, message: String },

    /// Error from the Supabase REST API
    #[error("Supabase error: {status} - {message}")]
    SupabaseError { status: u16, message: String },

    /// Upstream HTTP failure that is not tied to a specific service response
    #[error("Upstream error: {0}")]
    UpstreamError(String),

    /// Unsupported document type on upload
    #[error("Unsupported document type: {0}")]
    UnsupportedDocument(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            ApiError::UnsupportedDocument(msg) => {
                (StatusCode::BAD_REQUEST, "unsupported_document", msg)
            }
            ApiError::OpenAiError { status, message } => {
                let status_code = upstream_status(status);
                (status_code, "openai_error", message)
            }
            ApiError::PineconeError { status, message } => {
                let status_code = upstream_status(status);
                (status_code, "pinecone_error", message)
            }
            ApiError::SupabaseError { status, message } => {
                let status_code = upstream_status(status);
                (status_code, "supabase_error", message)
            }
            ApiError::UpstreamError(msg) => (StatusCode::BAD_GATEWAY, "upstream_error", msg),
            ApiError::Internal(err) => {
                // Log internal errors
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        }));

        (status, body).into_response()
    }
}

/// Map an upstream status code onto our response. Client errors pass through,
/// everything unexpected collapses to 502.
fn upstream_status(status: u16) -> StatusCode {
    match StatusCode::from_u16(status) {
        Ok(code) if code.is_client_error() => code,
        Ok(_) | Err(_) => StatusCode::BAD_GATEWAY,
    }
}
