use chrono::{DateTime, Utc};
use redb::{Database as RedbDatabase, ReadTransaction, ReadableTableMetadata, WriteTransaction};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::tables::*;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("Key already exists: {0}")]
    Conflict(String),
    #[error("Deserialization error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("Serialization error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),
    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),
}

/// Handle to the shared redb store. Cheap to clone; every clone talks to the
/// same underlying database.
#[derive(Clone)]
pub struct Database {
    db: Arc<RedbDatabase>,
}

/// Row counts reported by the stats endpoint
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreCounts {
    pub attempts: u64,
    pub histories: u64,
    pub messages: u64,
    pub sessions: u64,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("pin-relay.redb");
        let db = RedbDatabase::create(db_path)?;

        // Initialize tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PIN_ATTEMPTS)?;
            let _ = write_txn.open_table(AUTH_TOKENS)?;
            let _ = write_txn.open_table(AUTH_TOKEN_EXPIRY)?;
            let _ = write_txn.open_table(CHAT_SESSIONS)?;
            let _ = write_txn.open_table(CHAT_MESSAGES)?;
            let _ = write_txn.open_table(CHAT_HISTORIES)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }

    /// Cheap liveness probe used by the health endpoint
    pub fn ping(&self) -> Result<(), DatabaseError> {
        let read_txn = self.begin_read()?;
        let _ = read_txn.open_table(AUTH_TOKENS)?;
        Ok(())
    }

    pub fn counts(&self) -> Result<StoreCounts, DatabaseError> {
        let read_txn = self.begin_read()?;
        Ok(StoreCounts {
            attempts: read_txn.open_table(PIN_ATTEMPTS)?.len()?,
            histories: read_txn.open_table(CHAT_HISTORIES)?.len()?,
            messages: read_txn.open_table(CHAT_MESSAGES)?.len()?,
            sessions: read_txn.open_table(CHAT_SESSIONS)?.len()?,
        })
    }
}

/// Key for the token expiration index. Zero-padded millis sort chronologically.
pub(crate) fn expiry_key(expires_at: &DateTime<Utc>, token: &str) -> String {
    format!("{:020}:{token}", expires_at.timestamp_millis().max(0))
}

/// Extract the millisecond timestamp from an expiration index key
pub(crate) fn expiry_key_ms(key: &str) -> Option<i64> {
    key.split_once(':')?.0.parse().ok()
}

/// Key for append-only logs grouped by `prefix` and ordered by time
/// (zero-padded micros). The UUID suffix keeps keys unique when two rows
/// share a timestamp.
pub(crate) fn log_key(prefix: &str, at: &DateTime<Utc>) -> String {
    format!(
        "{prefix}|{:020}|{}",
        at.timestamp_micros().max(0),
        uuid::Uuid::new_v4().simple()
    )
}

/// Half-open key range covering every `log_key(prefix, t)` with `t >= since`
pub(crate) fn log_range(prefix: &str, since: &DateTime<Utc>) -> (String, String) {
    (
        format!("{prefix}|{:020}|", since.timestamp_micros().max(0)),
        format!("{prefix}|~"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expiry_key_round_trips_millis() {
        let at = Utc::now();
        let key = expiry_key(&at, "auth_abc");
        assert_eq!(expiry_key_ms(&key), Some(at.timestamp_millis()));
        assert!(expiry_key_ms("garbage").is_none());
    }

    #[test]
    fn test_expiry_keys_sort_chronologically() {
        let now = Utc::now();
        let earlier = expiry_key(&(now - Duration::days(400)), "zzz");
        let later = expiry_key(&now, "aaa");
        assert!(earlier < later);
    }

    #[test]
    fn test_log_range_bounds() {
        let now = Utc::now();
        let (start, end) = log_range("10.0.0.1", &(now - Duration::minutes(15)));

        let inside = log_key("10.0.0.1", &now);
        let stale = log_key("10.0.0.1", &(now - Duration::minutes(16)));
        let other = log_key("10.0.0.2", &now);

        assert!(inside >= start && inside < end);
        assert!(stale < start);
        assert!(!(other >= start && other < end));
    }
}
