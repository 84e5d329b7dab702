//! Shared test helpers, available to all `#[cfg(test)]` modules in the crate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use crate::config::{
    AuthConfig, Config, HousekeepingConfig, RateLimitConfig, ServerConfig, WebhookConfig,
};
use crate::storage::models::{AttemptRecord, AuthToken};
use crate::storage::Database;
use crate::AppState;

pub const TEST_PIN: &str = "182001";

/// Open a fresh database in a temporary directory.
///
/// Returns both the `Database` and the `TempDir` guard. The caller must
/// keep the `TempDir` alive for the duration of the test.
pub fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path()).unwrap();
    (db, temp_dir)
}

/// A minimal `Config` pointing the webhook at `webhook_url`
pub fn test_config(webhook_url: &str) -> Config {
    Config {
        auth: AuthConfig {
            pin_code: TEST_PIN.to_string(),
        },
        housekeeping: HousekeepingConfig::default(),
        rate_limit: RateLimitConfig::default(),
        server: ServerConfig {
            bind_address: "127.0.0.1:3001".to_string(),
            data_dir: "/tmp/test".to_string(),
            trusted_proxy_hops: 1,
        },
        webhook: WebhookConfig {
            timeout_ms: 1_000,
            url: webhook_url.to_string(),
        },
    }
}

/// Build a full `Arc<AppState>` around the given database.
pub fn test_state(db: Database, webhook_url: &str) -> Arc<AppState> {
    Arc::new(AppState::new(test_config(webhook_url), db).unwrap())
}

pub fn make_attempt(source: &str, success: bool, at: DateTime<Utc>) -> AttemptRecord {
    AttemptRecord {
        attempted_at: at,
        source_address: source.to_string(),
        success,
    }
}

/// Create an `AuthToken` whose value is `tok_{id}`.
pub fn make_token(id: &str, expires_at: DateTime<Utc>) -> AuthToken {
    AuthToken {
        created_at: Utc::now(),
        expires_at,
        issued_agent: None,
        issued_from: None,
        session_id: format!("session-{id}"),
        token: format!("tok_{id}"),
    }
}
