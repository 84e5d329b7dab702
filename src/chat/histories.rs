use chrono::{Duration, Utc};
use thiserror::Error;

use super::relay::SESSION_TTL_DAYS;
use crate::storage::models::ChatHistory;
use crate::storage::{Database, DatabaseError};

pub const MAX_GENERATED_TITLE_LEN: usize = 50;
pub const MAX_TITLE_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("{0}")]
    InvalidTitle(&'static str),
    #[error("Chat history not found")]
    NotFound,
}

/// Titled conversation entries shown in the sidebar
#[derive(Clone)]
pub struct ChatHistories {
    db: Database,
}

impl ChatHistories {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a history for `session_id`, titled after `first_message`.
    /// The session is created if it does not exist yet.
    pub fn create_from_message(
        &self,
        session_id: &str,
        first_message: &str,
    ) -> Result<ChatHistory, HistoryError> {
        self.db
            .ensure_session(session_id, Utc::now() + Duration::days(SESSION_TTL_DAYS))?;

        let now = Utc::now();
        let history = ChatHistory {
            created_at: now,
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            title: generate_title(first_message),
            updated_at: now,
        };
        self.db.put_history(&history)?;

        tracing::info!(history_id = %history.id, session_id = %session_id, "Chat history created");
        Ok(history)
    }

    pub fn list(&self) -> Result<Vec<ChatHistory>, HistoryError> {
        Ok(self.db.get_all_histories()?)
    }

    pub fn rename(&self, id: &str, title: &str) -> Result<ChatHistory, HistoryError> {
        let title = title.trim();
        validate_title(title)?;
        self.db
            .rename_history(id, title)?
            .ok_or(HistoryError::NotFound)
    }

    pub fn delete(&self, id: &str) -> Result<(), HistoryError> {
        if !self.db.delete_history(id)? {
            return Err(HistoryError::NotFound);
        }
        tracing::info!(history_id = %id, "Chat history deleted");
        Ok(())
    }
}

/// Title from the first sentence of a message, collapsed whitespace,
/// truncated with `...` past 50 characters.
pub fn generate_title(text: &str) -> String {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let sentence = match cleaned.find(['.', '!', '?']) {
        Some(0) | None => cleaned.as_str(),
        Some(end) => &cleaned[..=end],
    };

    if sentence.chars().count() > MAX_GENERATED_TITLE_LEN {
        let head: String = sentence
            .chars()
            .take(MAX_GENERATED_TITLE_LEN - 3)
            .collect();
        format!("{head}...")
    } else {
        sentence.to_string()
    }
}

pub fn validate_title(title: &str) -> Result<(), HistoryError> {
    if title.trim().is_empty() {
        return Err(HistoryError::InvalidTitle("Title cannot be empty"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(HistoryError::InvalidTitle(
            "Title must be 100 characters or less",
        ));
    }
    Ok(())
}
