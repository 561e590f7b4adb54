use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::Utc;
use futures::stream::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::chat::ChatService;
use crate::config::Config;
use crate::email::EmailNotifier;
use crate::error::ApiError;
use crate::ingest::IngestService;
use crate::models::chat::ChatRequest;
use crate::models::documents::IngestEvent;
use crate::models::user::UserData;
use crate::parser;
use crate::sse::encode_event;
use crate::supabase::{SaveOutcome, SupabaseClient};

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub chat: ChatService,
    pub ingest: IngestService,
    pub supabase: SupabaseClient,
    pub notifier: Option<EmailNotifier>,
}

/// Health check routes
pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}

/// Chat routes
pub fn chat_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat/stream", post(chat_stream_handler))
        .with_state(state)
}

/// Document ingestion and management routes
pub fn document_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/documents/upload", post(upload_document_handler))
        .route("/api/documents/stats", get(document_stats_handler))
        .route("/api/documents/:filename", delete(delete_document_handler))
        .with_state(state)
}

/// User data routes
pub fn data_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/data/save", post(save_user_data_handler))
        .route("/api/data", get(get_user_data_handler))
        .with_state(state)
}

/// GET / - Simple health check
async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "running",
        "message": "Market Chatbot API is running",
        "version": VERSION
    }))
}

/// GET /health - Detailed health check
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION
    }))
}

/// POST /api/chat/stream - Streaming chat turn
///
/// Responds with an SSE stream of start/progress/chunk/complete events.
async fn chat_stream_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    tracing::info!(
        "Request to /api/chat/stream: history={}, message_len={}",
        request.conversation_history.len(),
        request.message.len()
    );

    if request.message.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "message cannot be empty".to_string(),
        ));
    }

    let events = state.chat.respond(request);
    let byte_stream =
        events.map(|event| Ok::<Bytes, std::io::Error>(Bytes::from(encode_event(&event))));

    sse_response(Body::from_stream(byte_stream))
}

/// POST /api/documents/upload - Ingest a document
///
/// Accepts a multipart form with a `file` field. The file type is validated
/// up front; processing progress is streamed back as SSE.
async fn upload_document_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut filename = None;
    let mut data = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::ValidationError(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().map(|s| s.to_string());
            data = Some(field.bytes().await.map_err(|e| {
                ApiError::ValidationError(format!("Failed to read uploaded file: {}", e))
            })?);
        }
    }

    let filename =
        filename.ok_or_else(|| ApiError::ValidationError("missing file field".to_string()))?;
    let data = data.ok_or_else(|| ApiError::ValidationError("missing file field".to_string()))?;

    // Reject unsupported types before streaming starts so the client gets
    // a plain 400 instead of an SSE error event
    if !parser::is_supported(&filename) {
        return Err(ApiError::UnsupportedDocument(format!(
            "File type not allowed for '{}'. Allowed: {}",
            filename,
            parser::SUPPORTED_EXTENSIONS.join(", ")
        )));
    }

    tracing::info!(
        "Request to /api/documents/upload: '{}' ({} bytes)",
        filename,
        data.len()
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<IngestEvent>();
    let ingest = state.ingest.clone();
    let config = state.config.clone();

    tokio::spawn(async move {
        let started = Instant::now();
        let _ = tx.send(IngestEvent::Start {
            status: "uploading".to_string(),
            message: format!(
                "File received ({:.2} MB)",
                data.len() as f64 / 1024.0 / 1024.0
            ),
            progress: 0,
        });

        let result = ingest
            .process_document(&config, &filename, &data, &tx)
            .await;

        let event = if result.success {
            IngestEvent::Complete {
                success: true,
                message: "Document processed and indexed successfully".to_string(),
                filename: result.filename.unwrap_or(filename),
                chunks_processed: result.chunks_processed.unwrap_or(0),
                total_chars: result.total_chars.unwrap_or(0),
                processing_time: (started.elapsed().as_secs_f64() * 100.0).round() / 100.0,
            }
        } else {
            IngestEvent::Error {
                error: result
                    .error
                    .unwrap_or_else(|| "Failed to process document".to_string()),
            }
        };
        let _ = tx.send(event);
    });

    let byte_stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield Ok::<Bytes, std::io::Error>(Bytes::from(encode_event(&event)));
        }
    };

    sse_response(Body::from_stream(byte_stream))
}

/// GET /api/documents/stats - Vector index statistics
async fn document_stats_handler(State(state): State<AppState>) -> Json<Value> {
    let stats = state.ingest.document_stats().await;
    Json(serde_json::to_value(stats).unwrap_or_else(|_| json!({})))
}

/// DELETE /api/documents/:filename - Remove an indexed document
async fn delete_document_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.ingest.delete_document(&filename).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Document {} deleted", filename)
    })))
}

/// POST /api/data/save - Save user data directly
async fn save_user_data_handler(
    State(state): State<AppState>,
    Json(user_data): Json<UserData>,
) -> Result<Json<Value>, ApiError> {
    let outcome = state
        .supabase
        .save_user_data(&user_data, state.notifier.as_ref())
        .await?;

    let (message, id) = match outcome {
        SaveOutcome::Saved(record) => ("User data saved and sent successfully", record.id),
        SaveOutcome::AlreadyExists => ("User data already exists", None),
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "id": id
    })))
}

#[derive(Debug, Deserialize)]
struct GetDataParams {
    user_id: Option<i64>,
}

/// GET /api/data - Retrieve saved user data
async fn get_user_data_handler(
    State(state): State<AppState>,
    Query(params): Query<GetDataParams>,
) -> Result<Json<Value>, ApiError> {
    let data = state.supabase.get_user_data(params.user_id).await?;
    Ok(Json(json!({
        "success": true,
        "data": data
    })))
}

fn sse_response(body: Body) -> Result<Response, ApiError> {
    Response::builder()
        .status(200)
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("Connection", "keep-alive")
        .body(body)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to build response: {}", e)))
}
