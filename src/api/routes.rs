use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::require_bearer;
use super::rate_limit::{limit_chat_requests, limit_pin_attempts};
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Bearer-protected routes
    let protected_routes = Router::new()
        .route(
            "/api/chat",
            post(handlers::send_message).layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                limit_chat_requests,
            )),
        )
        .route("/api/chat/history/:session_id", get(handlers::get_history))
        .route(
            "/api/histories",
            get(handlers::list_histories).post(handlers::create_history),
        )
        .route(
            "/api/histories/:id",
            patch(handlers::rename_history).delete(handlers::delete_history),
        )
        .route("/api/stats", get(handlers::stats))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_bearer,
        ));

    let public_routes = Router::new()
        .route(
            "/auth/verify",
            post(handlers::verify).layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                limit_pin_attempts,
            )),
        )
        .route("/auth/logout", post(handlers::logout))
        .route("/health", get(handlers::health));

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
