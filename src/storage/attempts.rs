use chrono::{DateTime, Utc};
use redb::ReadableTable;

use super::db::{log_key, log_range, Database, DatabaseError};
use super::models::AttemptRecord;
use super::tables::*;

impl Database {
    // ========================================================================
    // PIN attempt log
    // ========================================================================

    /// Append one attempt record. Each call writes its own row, so concurrent
    /// attempts from the same source never contend on a shared counter.
    pub fn insert_attempt(&self, record: &AttemptRecord) -> Result<(), DatabaseError> {
        debug_assert!(
            !record.source_address.is_empty(),
            "attempt source must not be empty"
        );

        let key = log_key(&record.source_address, &record.attempted_at);
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(PIN_ATTEMPTS)?;
            let data = rmp_serde::to_vec_named(record)?;
            table.insert(key.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Count failed attempts from `source` with `attempted_at >= since`.
    pub fn count_failed_attempts_since(
        &self,
        source: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let (start, end) = log_range(source, &since);
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(PIN_ATTEMPTS)?;

        let mut failures = 0u64;
        for entry in table.range(start.as_str()..end.as_str())? {
            let (_, value) = entry?;
            let record: AttemptRecord = rmp_serde::from_slice(value.value())?;
            // A source containing '|' can share a key prefix with another one
            if record.source_address == source && !record.success && record.attempted_at >= since
            {
                failures += 1;
            }
        }

        Ok(failures)
    }

    /// All records for one source, oldest first
    pub fn get_attempts_by_source(&self, source: &str) -> Result<Vec<AttemptRecord>, DatabaseError> {
        let (start, end) = log_range(source, &DateTime::<Utc>::UNIX_EPOCH);
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(PIN_ATTEMPTS)?;

        let mut records = Vec::new();
        for entry in table.range(start.as_str()..end.as_str())? {
            let (_, value) = entry?;
            let record: AttemptRecord = rmp_serde::from_slice(value.value())?;
            if record.source_address == source {
                records.push(record);
            }
        }

        Ok(records)
    }

    /// Bulk-delete attempt records older than `cutoff` (retention housekeeping).
    pub fn delete_attempts_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let cutoff_us = cutoff.timestamp_micros();

        // Phase 1: collect stale keys. The log is ordered by source first, so
        // this is a full scan; it only runs from the background task.
        let stale: Vec<String> = {
            let read_txn = self.begin_read()?;
            let table = read_txn.open_table(PIN_ATTEMPTS)?;
            let mut result = Vec::new();
            for entry in table.iter()? {
                let (key, _) = entry?;
                let key_str = key.value();
                if log_key_micros(key_str).is_some_and(|us| us < cutoff_us) {
                    result.push(key_str.to_string());
                }
            }
            result
        };

        if stale.is_empty() {
            return Ok(0);
        }

        // Phase 2: delete
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(PIN_ATTEMPTS)?;
            for key in &stale {
                table.remove(key.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(stale.len())
    }
}

/// Timestamp component of a `log_key`, in micros. Splits from the right
/// because the prefix is caller-supplied and may itself contain '|'.
fn log_key_micros(key: &str) -> Option<i64> {
    let mut parts = key.rsplitn(3, '|');
    let _uuid = parts.next()?;
    parts.next()?.parse().ok()
}
