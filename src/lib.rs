//! pin-relay - PIN-gated relay between a chat client and an automation webhook
//!
//! This crate provides:
//! - Shared-PIN verification with constant-time comparison
//! - Per-source brute-force blocking over a rolling window
//! - Per-source request budgets on the PIN and chat endpoints
//! - Bearer tokens with lazy and swept expiry
//! - Outbound webhook calls with bounded retry and exponential backoff
//! - Persisted chat sessions, messages and titled histories
//! - redb embedded database (ACID, MVCC, crash-safe)
//! - REST API

pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod device;
pub mod expiration;
pub mod relay;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use api::rate_limit::RateLimiter;
use auth::{AttemptLedger, CredentialVerifier, TokenStore};
use chat::{ChatHistories, ChatRelay};
use config::Config;
use relay::{RelayError, ResilientClient};
use storage::Database;

/// Shared application state
pub struct AppState {
    pub chat: ChatRelay,
    pub chat_limiter: RateLimiter,
    pub config: Config,
    pub db: Database,
    pub histories: ChatHistories,
    pub ledger: AttemptLedger,
    pub pin_limiter: RateLimiter,
    pub tokens: TokenStore,
    pub verifier: CredentialVerifier,
}

impl AppState {
    /// Wire every service around one database handle
    pub fn new(config: Config, db: Database) -> Result<Self, RelayError> {
        let client = ResilientClient::new(config.webhook.timeout())?;
        Ok(Self::with_client(config, db, client))
    }

    /// Like [`new`](Self::new) with a caller-supplied outbound client
    pub fn with_client(config: Config, db: Database, client: ResilientClient) -> Self {
        let ledger = AttemptLedger::new(db.clone());
        let limits = &config.rate_limit;
        Self {
            chat: ChatRelay::new(db.clone(), client, config.webhook.url.clone()),
            chat_limiter: RateLimiter::new(limits.chat_max_requests, limits.chat_window()),
            pin_limiter: RateLimiter::new(limits.pin_max_requests, limits.pin_window()),
            histories: ChatHistories::new(db.clone()),
            tokens: TokenStore::new(db.clone()),
            verifier: CredentialVerifier::new(config.auth.pin_code.clone(), ledger.clone()),
            ledger,
            config,
            db,
        }
    }
}
