use chrono::{Duration, Utc};

use crate::storage::models::AttemptRecord;
use crate::storage::{Database, DatabaseError};

/// Append-only log of credential checks, keyed by source address.
#[derive(Clone)]
pub struct AttemptLedger {
    db: Database,
}

impl AttemptLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record one attempt. Best-effort: a storage failure is logged and
    /// swallowed so auditing can never fail the authentication flow.
    pub fn record(&self, source_address: &str, success: bool) {
        let record = AttemptRecord {
            attempted_at: Utc::now(),
            source_address: source_address.to_string(),
            success,
        };

        if let Err(e) = self.db.insert_attempt(&record) {
            tracing::error!(
                error = %e,
                source = %source_address,
                success,
                "Failed to record PIN attempt"
            );
        }
    }

    /// Failed attempts from `source_address` in the trailing `window`,
    /// measured against the wall clock.
    pub fn count_failures(
        &self,
        source_address: &str,
        window: Duration,
    ) -> Result<u64, DatabaseError> {
        let since = Utc::now() - window;
        self.db.count_failed_attempts_since(source_address, since)
    }

    /// Delete records older than `retention`. Housekeeping only.
    pub fn purge_older_than(&self, retention: Duration) -> Result<usize, DatabaseError> {
        let deleted = self.db.delete_attempts_before(Utc::now() - retention)?;
        if deleted > 0 {
            tracing::info!(count = deleted, "Purged old PIN attempt records");
        }
        Ok(deleted)
    }
}
