// src/handlers/chat.rs

use axum::{
    Json,
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::{
    ai::{AiClient, AiError, ChatTurn, CompletionRequest, prompts},
    error::AppError,
    models::chat_session::ChatMessage,
    models::exam::Subject,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub subject: String,
    pub topic: Option<String>,
    pub messages: Vec<ChatMessage>,
}

const SSE_HEADERS: [(header::HeaderName, &str); 2] = [
    (header::CONTENT_TYPE, "text/event-stream"),
    (header::CACHE_CONTROL, "no-cache"),
];

/// Streams a tutor reply as server-sent events in the provider's wire shape
/// (`data: {json}` chunks followed by `data: [DONE]`).
///
/// With a configured provider this transparently proxies the upstream
/// stream. Without one, or when the upstream call fails to open, it streams
/// a canned reply in the same shape, so the client's parser exercises one
/// code path in every mode.
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "SSE stream of completion deltas", content_type = "text/event-stream"),
        (status = 400, description = "Unknown subject or empty conversation")
    ),
    tag = "chat"
)]
pub async fn chat(
    State(ai): State<AiClient>,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    let subject: Subject = payload.subject.parse().map_err(AppError::BadRequest)?;

    if payload.messages.is_empty() {
        return Err(AppError::BadRequest(
            "At least one message is required".to_string(),
        ));
    }

    let mut turns = vec![ChatTurn::system(prompts::tutor_system_prompt(
        subject,
        payload.topic.as_deref(),
    ))];
    for message in &payload.messages {
        let role = match message.role.as_str() {
            "assistant" | "system" => message.role.clone(),
            _ => "user".to_string(),
        };
        turns.push(ChatTurn { role, content: message.content.clone() });
    }

    let body = if ai.is_configured() {
        match ai.stream(CompletionRequest::new(turns)).await {
            Ok(stream) => Body::from_stream(stream),
            Err(e) => {
                tracing::warn!("Chat completion failed, serving canned reply: {}", e);
                canned_body(subject)
            }
        }
    } else {
        canned_body(subject)
    };

    Ok((SSE_HEADERS, body))
}

fn canned_body(subject: Subject) -> Body {
    Body::from_stream(futures::stream::iter(
        canned_sse_chunks(subject).into_iter().map(Ok::<_, AiError>),
    ))
}

/// The offline reply, pre-split into provider-shaped SSE frames.
fn canned_sse_chunks(subject: Subject) -> Vec<Bytes> {
    let reply = prompts::canned_tutor_reply(subject);
    let words: Vec<&str> = reply.split(' ').collect();

    let mut chunks: Vec<Bytes> = words
        .chunks(12)
        .map(|group| {
            let mut text = group.join(" ");
            text.push(' ');
            let frame = json!({
                "choices": [{ "delta": { "content": text } }]
            });
            Bytes::from(format!("data: {}\n\n", frame))
        })
        .collect();

    chunks.push(Bytes::from_static(b"data: [DONE]\n\n"));
    chunks
}
