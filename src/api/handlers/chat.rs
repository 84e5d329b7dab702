use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, AppQuery, JSend};
use crate::chat::ChatError;
use crate::storage::models::{ChatMessage, MessageRole};
use crate::AppState;

/// Upper bound for `?limit=` on history reads
const MAX_HISTORY_LIMIT: usize = 500;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, alias = "userId")]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub data: Value,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub content: String,
    pub created_at: String,
    pub id: String,
    pub role: MessageRole,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub messages: Vec<MessageResponse>,
    pub session_id: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<ChatRequest>,
) -> Result<Json<JSend<ChatResponse>>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }

    let reply = state
        .chat
        .forward(&req.message, req.session_id)
        .await
        .map_err(chat_error)?;

    Ok(JSend::success(ChatResponse {
        data: reply.response.data,
        session_id: reply.session_id,
    }))
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    AppQuery(params): AppQuery<HistoryParams>,
) -> Result<Json<JSend<HistoryResponse>>, ApiError> {
    let limit = match params.limit {
        Some(0) => return Err(ApiError::bad_request("limit must be greater than 0")),
        Some(n) => Some(n.min(MAX_HISTORY_LIMIT)),
        None => None,
    };

    let messages = state.chat.history(&session_id, limit).map_err(chat_error)?;

    Ok(JSend::success(HistoryResponse {
        messages: messages.iter().map(message_to_response).collect(),
        session_id,
    }))
}

fn message_to_response(message: &ChatMessage) -> MessageResponse {
    MessageResponse {
        content: message.content.clone(),
        created_at: message.created_at.to_rfc3339(),
        id: message.id.clone(),
        role: message.role,
    }
}

/// Upstream detail is logged by the client; the caller only learns the relay failed.
fn chat_error(e: ChatError) -> ApiError {
    match e {
        ChatError::Relay(e) => {
            tracing::error!(error = %e, status = ?e.status(), "Chat relay failed");
            ApiError::bad_gateway("Upstream unavailable")
        }
        ChatError::Database(e) => ApiError::internal_from("Chat storage failed", e),
    }
}
