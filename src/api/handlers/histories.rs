use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::chat::HistoryError;
use crate::storage::models::ChatHistory;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHistoryRequest {
    pub message: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameHistoryRequest {
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub created_at: String,
    pub id: String,
    pub session_id: String,
    pub title: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: String,
}

pub async fn create_history(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateHistoryRequest>,
) -> Result<(StatusCode, Json<JSend<HistoryResponse>>), ApiError> {
    if req.session_id.trim().is_empty() || req.message.trim().is_empty() {
        return Err(ApiError::bad_request("sessionId and message are required"));
    }

    let history = state
        .histories
        .create_from_message(&req.session_id, &req.message)
        .map_err(history_error)?;

    Ok((StatusCode::CREATED, JSend::success(history_to_response(&history))))
}

pub async fn list_histories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<Vec<HistoryResponse>>>, ApiError> {
    let histories = state.histories.list().map_err(history_error)?;
    Ok(JSend::success(
        histories.iter().map(history_to_response).collect(),
    ))
}

pub async fn rename_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<RenameHistoryRequest>,
) -> Result<Json<JSend<HistoryResponse>>, ApiError> {
    let history = state
        .histories
        .rename(&id, &req.title)
        .map_err(history_error)?;
    Ok(JSend::success(history_to_response(&history)))
}

pub async fn delete_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<DeletedResponse>>, ApiError> {
    state.histories.delete(&id).map_err(history_error)?;
    Ok(JSend::success(DeletedResponse { id }))
}

fn history_to_response(history: &ChatHistory) -> HistoryResponse {
    HistoryResponse {
        created_at: history.created_at.to_rfc3339(),
        id: history.id.clone(),
        session_id: history.session_id.clone(),
        title: history.title.clone(),
        updated_at: history.updated_at.to_rfc3339(),
    }
}

fn history_error(e: HistoryError) -> ApiError {
    match e {
        HistoryError::NotFound => ApiError::not_found("Chat history not found"),
        HistoryError::InvalidTitle(msg) => ApiError::bad_request(msg),
        HistoryError::Database(e) => ApiError::internal_from("Chat history storage failed", e),
    }
}
