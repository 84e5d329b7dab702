use chrono::{DateTime, Utc};
use redb::ReadableTable;

use super::db::{expiry_key, expiry_key_ms, Database, DatabaseError};
use super::models::AuthToken;
use super::tables::*;

impl Database {
    // ========================================================================
    // Bearer token operations
    // ========================================================================

    /// Store a new token. Fails with `Conflict` if the value is already
    /// present; an existing row is never overwritten.
    pub fn put_token(&self, token: &AuthToken) -> Result<(), DatabaseError> {
        debug_assert!(!token.token.is_empty(), "token value must not be empty");
        debug_assert!(!token.session_id.is_empty(), "token session_id must not be empty");

        let write_txn = self.begin_write()?;
        let exists = {
            let table = write_txn.open_table(AUTH_TOKENS)?;
            let exists = table.get(token.token.as_str())?.is_some();
            exists
        };
        if exists {
            write_txn.abort()?;
            return Err(DatabaseError::Conflict(format!(
                "token {}...",
                token_prefix(&token.token)
            )));
        }

        {
            let mut table = write_txn.open_table(AUTH_TOKENS)?;
            let data = rmp_serde::to_vec_named(token)?;
            table.insert(token.token.as_str(), data.as_slice())?;

            let mut expiry_table = write_txn.open_table(AUTH_TOKEN_EXPIRY)?;
            let ek = expiry_key(&token.expires_at, &token.token);
            expiry_table.insert(ek.as_str(), token.token.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a token by its secret value
    pub fn get_token(&self, token: &str) -> Result<Option<AuthToken>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(AUTH_TOKENS)?;

        match table.get(token)? {
            Some(data) => {
                let record: AuthToken = rmp_serde::from_slice(data.value())?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Delete a token and its expiration index entry. Returns whether a row existed.
    pub fn delete_token(&self, token: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;

        let existing: Option<AuthToken> = {
            let table = write_txn.open_table(AUTH_TOKENS)?;
            let result = table.get(token)?;
            match result {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            }
        };

        let deleted = match existing {
            Some(record) => {
                {
                    let mut table = write_txn.open_table(AUTH_TOKENS)?;
                    table.remove(token)?;
                }
                {
                    let mut expiry_table = write_txn.open_table(AUTH_TOKEN_EXPIRY)?;
                    let ek = expiry_key(&record.expires_at, token);
                    expiry_table.remove(ek.as_str())?;
                }
                true
            }
            None => false,
        };

        write_txn.commit()?;
        Ok(deleted)
    }

    /// Delete tokens with `expires_at < before`, walking the expiration index
    /// in order and stopping at the first live entry (no full table scan).
    pub fn delete_expired_tokens(&self, before: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let before_ms = before.timestamp_millis();

        // Phase 1: read the expiration index to collect expired entries
        let expired: Vec<(String, String)> = {
            let read_txn = self.begin_read()?;
            let table = read_txn.open_table(AUTH_TOKEN_EXPIRY)?;
            let mut result = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                let key_str = key.value().to_string();
                match expiry_key_ms(&key_str) {
                    Some(ms) if ms < before_ms => {
                        result.push((key_str, value.value().to_string()));
                    }
                    _ => break,
                }
            }
            result
        };

        if expired.is_empty() {
            return Ok(0);
        }

        // Phase 2: delete tokens and index entries in one transaction
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(AUTH_TOKENS)?;
            let mut expiry_table = write_txn.open_table(AUTH_TOKEN_EXPIRY)?;
            for (ek, token) in &expired {
                table.remove(token.as_str())?;
                expiry_table.remove(ek.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(expired.len())
    }

    /// Count tokens with `expires_at > now`
    pub fn count_active_tokens(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let now_ms = now.timestamp_millis();
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(AUTH_TOKEN_EXPIRY)?;

        let mut active = 0u64;
        for entry in table.iter()? {
            let (key, _) = entry?;
            if expiry_key_ms(key.value()).is_some_and(|ms| ms > now_ms) {
                active += 1;
            }
        }
        Ok(active)
    }
}

/// First 10 characters of a token, safe to log
pub fn token_prefix(token: &str) -> &str {
    match token.char_indices().nth(10) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}
