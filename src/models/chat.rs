use serde::{Deserialize, Serialize};

use crate::models::user::UserData;

/// A prior turn in the conversation, as replayed by the frontend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

/// Chat request body for POST /api/chat/stream
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<HistoryMessage>,
    #[serde(default)]
    pub user_data: UserData,
}

/// Events emitted on the chat SSE stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    Start {
        status: String,
    },
    Progress {
        status: String,
        message: String,
    },
    Chunk {
        data: String,
    },
    Complete {
        response: String,
        user_data: UserData,
        rag_used: bool,
    },
    Error {
        error: String,
    },
}

impl ChatStreamEvent {
    pub fn start() -> Self {
        ChatStreamEvent::Start {
            status: "processing".to_string(),
        }
    }

    pub fn progress(status: &str, message: &str) -> Self {
        ChatStreamEvent::Progress {
            status: status.to_string(),
            message: message.to_string(),
        }
    }
}
