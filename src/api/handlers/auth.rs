use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::middleware::{bearer_token, source_address};
use crate::api::response::{ApiError, AppJson, JSend};
use crate::auth::CredentialError;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(alias = "pin")]
    pub secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub expires_in: String,
    pub session_id: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn verify(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    AppJson(req): AppJson<VerifyRequest>,
) -> Result<Json<JSend<VerifyResponse>>, ApiError> {
    let source = source_address(
        &headers,
        peer.as_ref(),
        state.config.server.trusted_proxy_hops,
    );

    state
        .verifier
        .verify(&req.secret, &source)
        .map_err(credential_error)?;

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    let token = state
        .tokens
        .issue(Some(&source), user_agent)
        .map_err(|e| ApiError::internal_from("Failed to issue token", e))?;

    Ok(JSend::success(VerifyResponse {
        expires_in: format!("{}h", state.tokens.ttl().num_hours()),
        session_id: token.session_id,
        token: token.token,
    }))
}

/// Always succeeds; revokes the presented token if there is one.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<JSend<LogoutResponse>> {
    if let Ok(token) = bearer_token(&headers) {
        if let Err(e) = state.tokens.revoke(token) {
            tracing::warn!(error = %e, "Failed to revoke token on logout");
        }
    }

    JSend::success(LogoutResponse {
        message: "Logged out successfully".to_string(),
    })
}

fn credential_error(e: CredentialError) -> ApiError {
    match e {
        CredentialError::Blocked { .. } => ApiError::too_many_requests("PIN_BLOCKED", e.to_string()),
        CredentialError::Format => ApiError::unauthorized("INVALID_PIN_FORMAT", e.to_string()),
        CredentialError::Incorrect => ApiError::unauthorized("INVALID_PIN", e.to_string()),
        CredentialError::Database(e) => ApiError::internal_from("PIN verification failed", e),
    }
}
