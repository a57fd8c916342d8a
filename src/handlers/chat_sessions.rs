// src/handlers/chat_sessions.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use sqlx::types::Json as SqlJson;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::chat_session::{ChatMessage, ChatSession, ChatSessionSummary, SaveChatSessionRequest},
    utils::{html::clean_html, jwt::Claims},
};

/// Session lists change rarely and are re-fetched on every dashboard visit,
/// so responses carry a short private cache window.
const LIST_CACHE_CONTROL: &str = "private, max-age=300";

#[derive(Debug, Deserialize)]
pub struct ListSessionsParams {
    pub subject: Option<String>,
    pub limit: Option<i64>,
}

/// List the current user's chat sessions, newest first, without transcripts.
#[utoipa::path(
    get,
    path = "/api/chat-sessions",
    params(
        ("subject" = Option<String>, Query, description = "Filter by subject"),
        ("limit" = Option<i64>, Query, description = "Max sessions to return")
    ),
    responses(
        (status = 200, description = "Session summaries", body = [ChatSessionSummary]),
        (status = 401, description = "Not signed in")
    ),
    tag = "chat-sessions"
)]
pub async fn list_sessions(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<ListSessionsParams>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);
    let limit = params.limit.unwrap_or(50).clamp(1, 100);

    let sessions = sqlx::query_as::<_, ChatSessionSummary>(
        r#"
        SELECT id, subject, topic, title, last_message, message_count,
               created_at, updated_at
        FROM chat_sessions
        WHERE user_id = $1
          AND ($2::TEXT IS NULL OR subject = $2)
        ORDER BY updated_at DESC
        LIMIT $3
        "#,
    )
    .bind(user_id)
    .bind(&params.subject)
    .bind(limit)
    .fetch_all(&pool)
    .await?;

    Ok((
        [(header::CACHE_CONTROL, LIST_CACHE_CONTROL)],
        Json(sessions),
    ))
}

/// Fetch one session with its full transcript.
#[utoipa::path(
    get,
    path = "/api/chat-sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session with transcript", body = ChatSession),
        (status = 404, description = "No such session for this user")
    ),
    tag = "chat-sessions"
)]
pub async fn get_session(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let session = sqlx::query_as::<_, ChatSession>(
        r#"
        SELECT id, user_id, subject, topic, title, last_message, messages,
               message_count, created_at, updated_at
        FROM chat_sessions
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Chat session not found".to_string()))?;

    Ok(Json(session))
}

/// Create or update a session. A payload with an `id` upserts; ownership is
/// enforced inside the upsert so one user cannot overwrite another's session.
#[utoipa::path(
    post,
    path = "/api/chat-sessions",
    request_body = SaveChatSessionRequest,
    responses(
        (status = 200, description = "Saved session", body = ChatSession),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Session id belongs to another user")
    ),
    tag = "chat-sessions"
)]
pub async fn save_session(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SaveChatSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.sub.parse::<i64>().unwrap_or(0);
    let id = payload.id.unwrap_or_else(Uuid::new_v4);

    let last_message = payload.preview().map(|p| clean_html(&p));
    let messages: Vec<ChatMessage> = payload
        .messages
        .into_iter()
        .map(|m| ChatMessage {
            role: m.role,
            content: clean_html(&m.content),
            timestamp: m.timestamp,
        })
        .collect();
    let message_count = messages.len() as i32;

    let session = sqlx::query_as::<_, ChatSession>(
        r#"
        INSERT INTO chat_sessions
            (id, user_id, subject, topic, title, last_message, messages, message_count)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (id) DO UPDATE SET
            subject = EXCLUDED.subject,
            topic = EXCLUDED.topic,
            title = EXCLUDED.title,
            last_message = EXCLUDED.last_message,
            messages = EXCLUDED.messages,
            message_count = EXCLUDED.message_count,
            updated_at = NOW()
        WHERE chat_sessions.user_id = EXCLUDED.user_id
        RETURNING id, user_id, subject, topic, title, last_message, messages,
                  message_count, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(clean_html(payload.subject.trim()))
    .bind(payload.topic.as_deref().map(|t| clean_html(t.trim())))
    .bind(clean_html(payload.title.trim()))
    .bind(&last_message)
    .bind(SqlJson(messages))
    .bind(message_count)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to save chat session: {:?}", e);
        AppError::from(e)
    })?
    .ok_or(AppError::NotFound("Chat session not found".to_string()))?;

    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
pub struct DeleteSessionsParams {
    pub id: Option<Uuid>,
}

/// Delete one session by id, or every session of the caller when no id is
/// given. Only the caller's own sessions are touched either way.
#[utoipa::path(
    delete,
    path = "/api/chat-sessions",
    params(("id" = Option<Uuid>, Query, description = "Session id; omit to delete all")),
    responses(
        (status = 200, description = "Deletion count"),
        (status = 404, description = "Session not found")
    ),
    tag = "chat-sessions"
)]
pub async fn delete_sessions(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<DeleteSessionsParams>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let result = match params.id {
        Some(id) => {
            let result = sqlx::query("DELETE FROM chat_sessions WHERE user_id = $1 AND id = $2")
                .bind(user_id)
                .bind(id)
                .execute(&pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(AppError::NotFound("Chat session not found".to_string()));
            }
            result
        }
        None => {
            sqlx::query("DELETE FROM chat_sessions WHERE user_id = $1")
                .bind(user_id)
                .execute(&pool)
                .await?
        }
    };

    Ok(Json(json!({ "deleted": result.rows_affected() })))
}
