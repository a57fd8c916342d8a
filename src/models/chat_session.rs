// src/models/chat_session.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// One turn of a tutoring conversation, stored inside the session's JSONB
/// transcript.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    /// 'user' or 'assistant'.
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

/// Row type for the `chat_sessions` table, transcript included.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: Uuid,

    #[serde(skip)]
    pub user_id: i64,

    pub subject: String,
    pub topic: Option<String>,
    pub title: String,

    /// Short preview of the latest message, for list views.
    pub last_message: Option<String>,

    /// Full transcript. Stored as a JSON array in the database.
    #[schema(value_type = Vec<ChatMessage>)]
    pub messages: Json<Vec<ChatMessage>>,

    pub message_count: i32,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Row without the transcript, for the session list.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatSessionSummary {
    pub id: Uuid,
    pub subject: String,
    pub topic: Option<String>,
    pub title: String,
    pub last_message: Option<String>,
    pub message_count: i32,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for saving a session. With an `id` this upserts; without, it creates.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SaveChatSessionRequest {
    pub id: Option<Uuid>,
    #[validate(length(min = 1, max = 50))]
    pub subject: String,
    #[validate(length(max = 200))]
    pub topic: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub messages: Vec<ChatMessage>,
}

impl SaveChatSessionRequest {
    /// Preview string derived from the newest message, clipped at a word
    /// boundary near 140 chars.
    pub fn preview(&self) -> Option<String> {
        let last = self.messages.last()?;
        let text = last.content.trim();
        if text.is_empty() {
            return None;
        }
        if text.chars().count() <= 140 {
            return Some(text.to_string());
        }
        let clipped: String = text.chars().take(140).collect();
        let cut = clipped.rfind(' ').unwrap_or(clipped.len());
        Some(format!("{}...", &clipped[..cut]))
    }
}
