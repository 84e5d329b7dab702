use chrono::{Duration, Utc};
use thiserror::Error;

use super::generator::{generate_session_id, generate_token};
use crate::device::parse_user_agent;
use crate::storage::db::DatabaseError;
use crate::storage::models::AuthToken;
use crate::storage::token_prefix;
use crate::storage::Database;

/// Lifetime of an issued bearer token
pub const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Token expired")]
    Expired,
    #[error("Token not found")]
    NotFound,
}

/// Issues, validates and revokes bearer tokens. Holds no state of its own
/// beyond the store handle, so any number of instances share one view.
#[derive(Clone)]
pub struct TokenStore {
    db: Database,
    ttl: Duration,
}

impl TokenStore {
    pub fn new(db: Database) -> Self {
        Self::with_ttl(db, Duration::hours(TOKEN_TTL_HOURS))
    }

    pub fn with_ttl(db: Database, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token bound to a fresh session id. A value collision surfaces
    /// as `DatabaseError::Conflict`. Expired rows are swept afterwards.
    pub fn issue(
        &self,
        source_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<AuthToken, TokenError> {
        let now = Utc::now();
        let token = AuthToken {
            created_at: now,
            expires_at: now + self.ttl,
            issued_agent: user_agent.map(parse_user_agent),
            issued_from: source_address.map(str::to_string),
            session_id: generate_session_id(),
            token: generate_token(),
        };

        self.db.put_token(&token)?;
        tracing::info!(
            session_id = %token.session_id,
            source = ?source_address,
            agent = ?token.issued_agent.as_ref().map(|a| a.summary()),
            "Issued bearer token"
        );

        if let Err(e) = self.purge_expired() {
            tracing::warn!(error = %e, "Expired token sweep failed");
        }

        Ok(token)
    }

    /// Look up a token. Absent tokens are `NotFound`; expired ones are
    /// deleted and reported as `Expired`. Never extends `expires_at`.
    pub fn validate(&self, token: &str) -> Result<AuthToken, TokenError> {
        let record = self.db.get_token(token)?.ok_or(TokenError::NotFound)?;

        if record.is_expired_at(Utc::now()) {
            if let Err(e) = self.db.delete_token(token) {
                tracing::warn!(error = %e, token = %token_prefix(token), "Failed to delete expired token");
            }
            tracing::debug!(token = %token_prefix(token), "Bearer token expired");
            return Err(TokenError::Expired);
        }

        Ok(record)
    }

    /// Boolean form of [`validate`](Self::validate); only storage failures are errors.
    pub fn is_valid(&self, token: &str) -> Result<bool, TokenError> {
        match self.validate(token) {
            Ok(_) => Ok(true),
            Err(TokenError::NotFound | TokenError::Expired) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete a token. Revoking an absent token is not an error.
    pub fn revoke(&self, token: &str) -> Result<(), TokenError> {
        if self.db.delete_token(token)? {
            tracing::info!(token = %token_prefix(token), "Revoked bearer token");
        }
        Ok(())
    }

    /// Tokens with `expires_at > now`
    pub fn active_count(&self) -> Result<u64, TokenError> {
        Ok(self.db.count_active_tokens(Utc::now())?)
    }

    /// Delete every token with `expires_at < now`
    pub fn purge_expired(&self) -> Result<usize, TokenError> {
        let deleted = self.db.delete_expired_tokens(Utc::now())?;
        if deleted > 0 {
            tracing::info!(count = deleted, "Cleaned up expired tokens");
        }
        Ok(deleted)
    }
}
