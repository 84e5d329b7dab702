use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub database: String,
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub active_tokens: u64,
    pub histories: u64,
    pub messages: u64,
    pub sessions: u64,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<JSend<HealthResponse>> {
    let (status, database) = match state.db.ping() {
        Ok(()) => ("healthy", "connected"),
        Err(e) => {
            tracing::error!(error = %e, "Health check database ping failed");
            ("degraded", "unavailable")
        }
    };

    JSend::success(HealthResponse {
        database: database.to_string(),
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<JSend<StatsResponse>>, ApiError> {
    let active_tokens = state
        .tokens
        .active_count()
        .map_err(|e| ApiError::internal_from("Failed to count tokens", e))?;
    let counts = state
        .db
        .counts()
        .map_err(|e| ApiError::internal_from("Failed to count records", e))?;

    Ok(JSend::success(StatsResponse {
        active_tokens,
        histories: counts.histories,
        messages: counts.messages,
        sessions: counts.sessions,
    }))
}
