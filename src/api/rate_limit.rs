//! Per-source request budgets.
//!
//! Each source address gets a fixed window that opens on its first request
//! and holds `max_requests` calls. Requests over budget are answered with
//! 429 `RATE_LIMIT_EXCEEDED` before reaching the handler. Every response
//! carries `RateLimit-Limit`, `RateLimit-Remaining` and `RateLimit-Reset`.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::middleware::source_address;
use super::response::ApiError;
use crate::AppState;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

/// Outcome of counting one request against a source's budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

/// In-memory fixed-window limiter keyed by source address.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count a request from `source`. Rejected requests do not use up budget.
    pub async fn check(&self, source: &str) -> Decision {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        let entry = windows.entry(source.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                count: 0,
                started: now,
            };
        }

        let allowed = entry.count < self.max_requests;
        if allowed {
            entry.count += 1;
        }

        Decision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.count),
            reset_after: self
                .window
                .saturating_sub(now.duration_since(entry.started)),
        }
    }

    /// Drop windows that have closed. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.started) < self.window);
        before - windows.len()
    }

    #[cfg(test)]
    async fn tracked_sources(&self) -> usize {
        self.windows.lock().await.len()
    }
}

/// Budget for `POST /auth/verify`
pub async fn limit_pin_attempts(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let source = source_address(
        request.headers(),
        peer.as_ref(),
        state.config.server.trusted_proxy_hops,
    );
    enforce(
        &state.pin_limiter,
        &source,
        "Too many PIN attempts, please try again later",
        request,
        next,
    )
    .await
}

/// Budget for `POST /api/chat`
pub async fn limit_chat_requests(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let source = source_address(
        request.headers(),
        peer.as_ref(),
        state.config.server.trusted_proxy_hops,
    );
    enforce(
        &state.chat_limiter,
        &source,
        "Too many requests, please try again later",
        request,
        next,
    )
    .await
}

async fn enforce(
    limiter: &RateLimiter,
    source: &str,
    message: &'static str,
    request: Request<Body>,
    next: Next,
) -> Response {
    let decision = limiter.check(source).await;

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        tracing::warn!(source = %source, path = %request.uri().path(), "Rate limit exceeded");
        let mut response =
            ApiError::too_many_requests("RATE_LIMIT_EXCEEDED", message).into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(reset_seconds(&decision)));
        response
    };

    add_rate_limit_headers(response.headers_mut(), &decision);
    response
}

fn add_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(
        HeaderName::from_static("ratelimit-limit"),
        HeaderValue::from(decision.limit),
    );
    headers.insert(
        HeaderName::from_static("ratelimit-remaining"),
        HeaderValue::from(decision.remaining),
    );
    headers.insert(
        HeaderName::from_static("ratelimit-reset"),
        HeaderValue::from(reset_seconds(decision)),
    );
}

/// Whole seconds until the window reopens, rounded up
fn reset_seconds(decision: &Decision) -> u64 {
    let reset = decision.reset_after;
    reset.as_secs() + u64::from(reset.subsec_nanos() > 0)
}
