//! PIN verification with per-source brute-force protection.
//!
//! The block check runs before anything else and has no side effects: a
//! blocked caller learns only that it is blocked, and the ledger is not
//! touched, so the ledger cannot be used to tell a block from a wrong PIN.

use chrono::Duration;
use subtle::{Choice, ConstantTimeEq};
use thiserror::Error;

use super::ledger::AttemptLedger;
use crate::storage::DatabaseError;

/// Failed attempts inside the window that trigger a block
pub const MAX_FAILED_ATTEMPTS: u64 = 5;

/// Rolling window over which failures are counted
pub const BLOCK_WINDOW_MINUTES: i64 = 15;

/// Required PIN length
pub const PIN_LENGTH: usize = 6;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Too many failed attempts. Try again in {window_minutes} minutes.")]
    Blocked { window_minutes: i64 },
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("PIN must be 6 digits")]
    Format,
    #[error("Incorrect PIN")]
    Incorrect,
}

#[derive(Debug, Clone, Copy)]
pub struct BlockPolicy {
    pub max_failed_attempts: u64,
    pub window: Duration,
}

impl Default for BlockPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: MAX_FAILED_ATTEMPTS,
            window: Duration::minutes(BLOCK_WINDOW_MINUTES),
        }
    }
}

/// Sole authority on whether a presented PIN is correct and whether a
/// source address may currently try.
#[derive(Clone)]
pub struct CredentialVerifier {
    expected: String,
    ledger: AttemptLedger,
    policy: BlockPolicy,
}

impl CredentialVerifier {
    pub fn new(expected: impl Into<String>, ledger: AttemptLedger) -> Self {
        Self::with_policy(expected, ledger, BlockPolicy::default())
    }

    pub fn with_policy(
        expected: impl Into<String>,
        ledger: AttemptLedger,
        policy: BlockPolicy,
    ) -> Self {
        Self {
            expected: expected.into(),
            ledger,
            policy,
        }
    }

    pub fn is_blocked(&self, source_address: &str) -> Result<bool, DatabaseError> {
        let failures = self
            .ledger
            .count_failures(source_address, self.policy.window)?;
        Ok(failures >= self.policy.max_failed_attempts)
    }

    /// Check `secret` for `source_address`, recording exactly one attempt
    /// unless the source is blocked.
    pub fn verify(&self, secret: &str, source_address: &str) -> Result<(), CredentialError> {
        if self.is_blocked(source_address)? {
            tracing::warn!(source = %source_address, "PIN verification blocked");
            return Err(CredentialError::Blocked {
                window_minutes: self.policy.window.num_minutes(),
            });
        }

        if !is_well_formed(secret) {
            self.ledger.record(source_address, false);
            tracing::warn!(source = %source_address, "PIN verification failed: bad format");
            return Err(CredentialError::Format);
        }

        let valid = constant_time_eq(secret.as_bytes(), self.expected.as_bytes());
        self.ledger.record(source_address, valid);

        if valid {
            tracing::info!(source = %source_address, "PIN verification successful");
            Ok(())
        } else {
            tracing::warn!(source = %source_address, "PIN verification failed");
            Err(CredentialError::Incorrect)
        }
    }
}

/// Exactly `PIN_LENGTH` ASCII digits
pub fn is_well_formed(secret: &str) -> bool {
    secret.len() == PIN_LENGTH && secret.bytes().all(|b| b.is_ascii_digit())
}

/// Equality whose running time depends only on the longer input's length.
pub fn constant_time_eq(presented: &[u8], expected: &[u8]) -> bool {
    compare_positions(presented, expected).0
}

/// Visits every position up to the longer length, folding each byte
/// comparison into one `Choice`. Also returns the number of positions
/// visited.
fn compare_positions(presented: &[u8], expected: &[u8]) -> (bool, usize) {
    let len = presented.len().max(expected.len());
    let mut equal: Choice = (presented.len() as u64).ct_eq(&(expected.len() as u64));
    let mut visited = 0usize;

    for i in 0..len {
        let a = presented.get(i).copied().unwrap_or(0);
        let b = expected.get(i).copied().unwrap_or(0);
        equal &= a.ct_eq(&b);
        visited += 1;
    }

    (bool::from(equal), visited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{make_attempt, setup_db};
    use chrono::Utc;

    const PIN: &str = "182001";

    fn verifier() -> (CredentialVerifier, crate::storage::Database, tempfile::TempDir) {
        let (db, temp) = setup_db();
        let verifier = CredentialVerifier::new(PIN, AttemptLedger::new(db.clone()));
        (verifier, db, temp)
    }

    fn seed_failures(db: &crate::storage::Database, source: &str, n: usize, minutes_ago: i64) {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        for _ in 0..n {
            db.insert_attempt(&make_attempt(source, false, at)).unwrap();
        }
    }

    #[test]
    fn test_block_threshold() {
        let (verifier, db, _temp) = verifier();

        seed_failures(&db, "10.0.0.1", 4, 1);
        assert!(!verifier.is_blocked("10.0.0.1").unwrap());

        seed_failures(&db, "10.0.0.1", 1, 1);
        assert!(verifier.is_blocked("10.0.0.1").unwrap());
        assert!(!verifier.is_blocked("10.0.0.2").unwrap());
    }

    #[test]
    fn test_correct_pin() {
        let (verifier, db, _temp) = verifier();
        verifier.verify(PIN, "10.0.0.1").unwrap();

        let records = db.get_attempts_by_source("10.0.0.1").unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
    }

    #[test]
    fn test_wrong_pin_records_one_failure() {
        let (verifier, db, _temp) = verifier();
        assert!(matches!(
            verifier.verify("000000", "10.0.0.1"),
            Err(CredentialError::Incorrect)
        ));

        let records = db.get_attempts_by_source("10.0.0.1").unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
    }

    #[test]
    fn test_malformed_pin_counts_as_failure() {
        let (verifier, db, _temp) = verifier();
        for bad in ["12345", "1234567", "12a456", "", "١٢٣٤٥٦"] {
            assert!(matches!(
                verifier.verify(bad, "10.0.0.1"),
                Err(CredentialError::Format)
            ));
        }
        assert_eq!(db.get_attempts_by_source("10.0.0.1").unwrap().len(), 5);
        assert!(verifier.is_blocked("10.0.0.1").unwrap());
    }

    #[test]
    fn test_padded_pin_is_malformed() {
        let (verifier, _db, _temp) = verifier();
        for padded in [" 182001", "182001 ", "182001\n", "\t182001"] {
            assert!(
                matches!(verifier.verify(padded, "10.0.0.1"), Err(CredentialError::Format)),
                "{padded:?}"
            );
        }
    }

    #[test]
    fn test_blocked_source_writes_nothing() {
        let (verifier, db, _temp) = verifier();
        seed_failures(&db, "10.0.0.1", 5, 1);
        let before = db.counts().unwrap().attempts;

        let result = verifier.verify(PIN, "10.0.0.1");
        assert!(matches!(
            result,
            Err(CredentialError::Blocked { window_minutes: 15 })
        ));
        assert_eq!(db.counts().unwrap().attempts, before);
    }

    #[test]
    fn test_block_expires_with_window() {
        let (verifier, db, _temp) = verifier();
        seed_failures(&db, "10.0.0.1", 5, BLOCK_WINDOW_MINUTES + 1);

        assert!(!verifier.is_blocked("10.0.0.1").unwrap());
        verifier.verify(PIN, "10.0.0.1").unwrap();
    }

    #[test]
    fn test_success_does_not_clear_failures() {
        let (verifier, db, _temp) = verifier();
        seed_failures(&db, "10.0.0.1", 4, 1);

        verifier.verify(PIN, "10.0.0.1").unwrap();
        let _ = verifier.verify("000000", "10.0.0.1");

        assert!(verifier.is_blocked("10.0.0.1").unwrap());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"182001", b"182001"));
        assert!(!constant_time_eq(b"182001", b"182002"));
        assert!(!constant_time_eq(b"18200", b"182001"));
        assert!(!constant_time_eq(b"1820010", b"182001"));
        assert!(!constant_time_eq(b"", b"182001"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_comparison_cost_independent_of_mismatch_position() {
        let (ok_first, first) = compare_positions(b"082001", b"182001");
        let (ok_last, last) = compare_positions(b"182000", b"182001");
        assert!(!ok_first && !ok_last);
        assert_eq!(first, last);
        assert_eq!(first, 6);

        // A length mismatch still walks the longer input
        let (ok_short, short) = compare_positions(b"18", b"182001");
        assert!(!ok_short);
        assert_eq!(short, 6);
    }
}
