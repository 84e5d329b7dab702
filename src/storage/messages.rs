use chrono::{DateTime, Utc};
use redb::ReadableTable;

use super::db::{log_key, log_range, Database, DatabaseError};
use super::models::ChatMessage;
use super::tables::*;

impl Database {
    // ========================================================================
    // Chat message log
    // ========================================================================

    pub fn append_message(&self, message: &ChatMessage) -> Result<(), DatabaseError> {
        let key = log_key(&message.session_id, &message.created_at);
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(CHAT_MESSAGES)?;
            let data = rmp_serde::to_vec_named(message)?;
            table.insert(key.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Messages of one session, oldest first, at most `limit` of them
    pub fn get_messages_by_session(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>, DatabaseError> {
        let (start, end) = log_range(session_id, &DateTime::<Utc>::UNIX_EPOCH);
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(CHAT_MESSAGES)?;

        let limit = limit.unwrap_or(usize::MAX);
        let mut messages = Vec::new();
        for entry in table.range(start.as_str()..end.as_str())? {
            if messages.len() >= limit {
                break;
            }
            let (_, value) = entry?;
            let message: ChatMessage = rmp_serde::from_slice(value.value())?;
            if message.session_id == session_id {
                messages.push(message);
            }
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::MessageRole;
    use crate::testutil::setup_db;
    use chrono::Duration;

    fn message(session: &str, content: &str, at: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            content: content.to_string(),
            created_at: at,
            id: uuid::Uuid::new_v4().to_string(),
            role: MessageRole::User,
            session_id: session.to_string(),
        }
    }

    #[test]
    fn test_messages_ordered_oldest_first() {
        let (db, _temp) = setup_db();
        let now = Utc::now();

        db.append_message(&message("s1", "second", now)).unwrap();
        db.append_message(&message("s1", "first", now - Duration::seconds(5)))
            .unwrap();
        db.append_message(&message("s2", "other", now)).unwrap();

        let messages = db.get_messages_by_session("s1", None).unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[test]
    fn test_messages_limit() {
        let (db, _temp) = setup_db();
        let now = Utc::now();
        for i in 0..5 {
            db.append_message(&message("s1", &format!("m{i}"), now + Duration::seconds(i)))
                .unwrap();
        }

        let messages = db.get_messages_by_session("s1", Some(2)).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "m0");
        assert!(db.get_messages_by_session("nobody", None).unwrap().is_empty());
    }
}
