use chrono::{DateTime, Utc};
use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::ChatSession;
use super::tables::*;

impl Database {
    // ========================================================================
    // Chat session operations
    // ========================================================================

    /// Return the session with this id, creating it with `expires_at` if it
    /// does not exist yet. Lookup and insert share one write transaction.
    /// The boolean is true when the row was created by this call.
    pub fn ensure_session(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(ChatSession, bool), DatabaseError> {
        debug_assert!(!session_id.is_empty(), "session id must not be empty");

        let write_txn = self.begin_write()?;
        let existing: Option<ChatSession> = {
            let table = write_txn.open_table(CHAT_SESSIONS)?;
            let result = table.get(session_id)?;
            match result {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            }
        };

        if let Some(session) = existing {
            write_txn.abort()?;
            return Ok((session, false));
        }

        let now = Utc::now();
        let session = ChatSession {
            created_at: now,
            expires_at,
            last_activity_at: now,
            message_count: 0,
            session_id: session_id.to_string(),
        };
        {
            let mut table = write_txn.open_table(CHAT_SESSIONS)?;
            let data = rmp_serde::to_vec_named(&session)?;
            table.insert(session_id, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok((session, true))
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(CHAT_SESSIONS)?;

        match table.get(session_id)? {
            Some(data) => {
                let session: ChatSession = rmp_serde::from_slice(data.value())?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Record one message exchange: set `last_activity_at` to now and
    /// increment `message_count`. `expires_at` is left untouched.
    pub fn touch_session(&self, session_id: &str) -> Result<ChatSession, DatabaseError> {
        let write_txn = self.begin_write()?;
        let existing = {
            let table = write_txn.open_table(CHAT_SESSIONS)?;
            let result = match table.get(session_id)? {
                Some(data) => Some(rmp_serde::from_slice::<ChatSession>(data.value())?),
                None => None,
            };
            result
        };

        let Some(mut session) = existing else {
            write_txn.abort()?;
            return Err(DatabaseError::NotFound(format!("session {session_id}")));
        };

        session.last_activity_at = Utc::now();
        session.message_count += 1;
        {
            let serialized = rmp_serde::to_vec_named(&session)?;
            let mut table = write_txn.open_table(CHAT_SESSIONS)?;
            table.insert(session_id, serialized.as_slice())?;
        }
        write_txn.commit()?;
        Ok(session)
    }
}
