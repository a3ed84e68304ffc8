//! services/api/src/web/chat.rs
//!
//! The advisor chat: a question about the user's own documents, answered by
//! the configured model with the previous turns of the conversation.

use axum::{extract::State, http::StatusCode, Extension, Json};
use coaching_core::domain::{ChatRole, ChatTurn, Document, DocumentKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::errors::{
    bad_request, document_error, error_response, port_error, ErrorBody, HandlerResult,
};
use crate::web::rest::not_configured;
use crate::web::state::AppState;

/// Upper bound on document text sent along with a question.
const MAX_CONTEXT_CHARS: usize = 24_000;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct ChatTurnBody {
    /// `user` or `assistant`.
    pub role: String,
    pub content: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub document_ids: Vec<Uuid>,
    #[serde(default)]
    pub history: Vec<ChatTurnBody>,
}

#[derive(Serialize, ToSchema)]
pub struct ChatResponse {
    pub answer: String,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn to_turns(history: Vec<ChatTurnBody>) -> HandlerResult<Vec<ChatTurn>> {
    history
        .into_iter()
        .map(|turn| {
            let role = match turn.role.as_str() {
                "user" => ChatRole::User,
                "assistant" => ChatRole::Assistant,
                other => return Err(bad_request(format!("Unknown chat role '{}'", other))),
            };
            Ok(ChatTurn {
                role,
                content: turn.content,
            })
        })
        .collect()
}

/// Plain text documents are inlined; other kinds are only named.
async fn build_context(state: &AppState, user_id: Uuid, selected: &[Document]) -> HandlerResult<String> {
    let mut context = String::new();
    for document in selected {
        let section = match document.kind {
            DocumentKind::Txt => {
                let bytes = state
                    .documents
                    .read_document(user_id, document.id)
                    .await
                    .map_err(|e| port_error(&e))?;
                format!("## {}\n{}\n\n", document.name, String::from_utf8_lossy(&bytes))
            }
            _ => format!("## {}\n[{} document, content not inlined]\n\n", document.name, document.kind.mime_type()),
        };
        context.push_str(&section);
    }
    Ok(truncate_chars(context, MAX_CONTEXT_CHARS))
}

fn truncate_chars(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => {
            warn!(chars = text.chars().count(), max, "Chat context truncated");
            text[..cut].to_string()
        }
        None => text,
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Ask the advisor a question about selected documents.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "The advisor's answer", body = ChatResponse),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 404, description = "Unknown document", body = ErrorBody),
        (status = 502, description = "Model unavailable", body = ErrorBody),
        (status = 503, description = "Chat not configured", body = ErrorBody)
    )
)]
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<ChatRequest>,
) -> HandlerResult<Json<ChatResponse>> {
    let chat = state.chat.clone().ok_or_else(|| not_configured("The advisor chat"))?;

    let question = req.question.trim();
    if question.is_empty() {
        return Err(bad_request("A question is required"));
    }
    let history = to_turns(req.history)?;

    let documents = state
        .library(user_id)
        .list()
        .await
        .map_err(|e| document_error(&e))?;
    let mut selected = Vec::with_capacity(req.document_ids.len());
    for id in &req.document_ids {
        let document = documents
            .iter()
            .find(|d| d.id == *id)
            .ok_or_else(|| error_response(StatusCode::NOT_FOUND, format!("Document {} not found", id)))?;
        selected.push(document.clone());
    }

    let context = build_context(&state, user_id, &selected).await?;
    let answer = chat
        .answer(question, &context, &history)
        .await
        .map_err(|e| port_error(&e))?;

    info!(%user_id, documents = selected.len(), turns = history.len(), "Advisor chat answered");
    Ok(Json(ChatResponse { answer }))
}
