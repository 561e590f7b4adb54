use serde::{Deserialize, Serialize};

/// Vector index statistics for GET /api/documents/stats
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentStats {
    pub total_vectors: u64,
    pub dimension: u64,
    pub index_fullness: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a document ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chars: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessingResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            filename: None,
            chunks_processed: None,
            total_chars: None,
            error: Some(error.into()),
        }
    }
}

/// Events emitted on the document upload SSE stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestEvent {
    Start {
        status: String,
        message: String,
        progress: u8,
    },
    Progress {
        status: String,
        message: String,
        progress: u8,
    },
    Complete {
        success: bool,
        message: String,
        filename: String,
        chunks_processed: usize,
        total_chars: usize,
        processing_time: f64,
    },
    Error {
        error: String,
    },
}

impl IngestEvent {
    pub fn progress(status: &str, message: impl Into<String>, progress: u8) -> Self {
        IngestEvent::Progress {
            status: status.to_string(),
            message: message.into(),
            progress,
        }
    }
}
