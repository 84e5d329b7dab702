use chrono::Utc;
use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::ChatHistory;
use super::tables::*;

impl Database {
    // ========================================================================
    // Chat history operations
    // ========================================================================

    pub fn put_history(&self, history: &ChatHistory) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(CHAT_HISTORIES)?;
            let data = rmp_serde::to_vec_named(history)?;
            table.insert(history.id.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All histories, newest first
    pub fn get_all_histories(&self) -> Result<Vec<ChatHistory>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(CHAT_HISTORIES)?;

        let mut histories = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let history: ChatHistory = rmp_serde::from_slice(value.value())?;
            histories.push(history);
        }

        histories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(histories)
    }

    /// Replace the title of an existing history. Returns `None` if the id is unknown.
    pub fn rename_history(
        &self,
        id: &str,
        title: &str,
    ) -> Result<Option<ChatHistory>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let existing = {
            let table = write_txn.open_table(CHAT_HISTORIES)?;
            let result = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice::<ChatHistory>(data.value())?),
                None => None,
            };
            result
        };

        let Some(mut history) = existing else {
            write_txn.abort()?;
            return Ok(None);
        };

        history.title = title.to_string();
        history.updated_at = Utc::now();
        {
            let serialized = rmp_serde::to_vec_named(&history)?;
            let mut table = write_txn.open_table(CHAT_HISTORIES)?;
            table.insert(id, serialized.as_slice())?;
        }
        write_txn.commit()?;
        Ok(Some(history))
    }

    pub fn delete_history(&self, id: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let deleted = {
            let mut table = write_txn.open_table(CHAT_HISTORIES)?;
            let removed = table.remove(id)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(deleted)
    }
}
