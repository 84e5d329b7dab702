use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::auth::generate_session_id;
use crate::relay::{RelayError, RelayResponse, ResilientClient};
use crate::storage::models::{ChatMessage, MessageRole};
use crate::storage::{Database, DatabaseError};

/// Lifetime given to a chat session when it is first seen
pub const SESSION_TTL_DAYS: i64 = 30;

/// Stored as the assistant reply when the webhook answers with an empty body
pub const EMPTY_REPLY: &str = "No response from webhook";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),
}

/// Body posted to the automation webhook
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    chat_input: &'a str,
    session_id: &'a str,
}

/// Result of a relayed message
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub response: RelayResponse,
    pub session_id: String,
}

/// Sequences one chat exchange: persist inbound, call the webhook, persist
/// the reply.
#[derive(Clone)]
pub struct ChatRelay {
    client: ResilientClient,
    db: Database,
    session_ttl: Duration,
    webhook_url: String,
}

impl ChatRelay {
    pub fn new(db: Database, client: ResilientClient, webhook_url: impl Into<String>) -> Self {
        Self {
            client,
            db,
            session_ttl: Duration::days(SESSION_TTL_DAYS),
            webhook_url: webhook_url.into(),
        }
    }

    /// Relay `message` for `session_id`, generating a session id when none
    /// is given. The user message is stored before the outbound call, so it
    /// survives a relay failure.
    #[tracing::instrument(skip(self, message, session_id), fields(session_id))]
    pub async fn forward(
        &self,
        message: &str,
        session_id: Option<String>,
    ) -> Result<ChatReply, ChatError> {
        let session_id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(generate_session_id);
        tracing::Span::current().record("session_id", session_id.as_str());

        let (_, created) = self
            .db
            .ensure_session(&session_id, Utc::now() + self.session_ttl)?;
        if created {
            tracing::info!(session_id = %session_id, "Created chat session");
        }

        self.db
            .append_message(&new_message(&session_id, MessageRole::User, message))?;
        self.db.touch_session(&session_id)?;

        let payload = WebhookPayload {
            chat_input: message,
            session_id: &session_id,
        };
        let response = self.client.post_json(&self.webhook_url, &payload).await?;

        let reply = extract_assistant_message(&response.data);
        self.db
            .append_message(&new_message(&session_id, MessageRole::Assistant, &reply))?;

        tracing::debug!(status = response.status, "Relayed chat message");
        Ok(ChatReply {
            response,
            session_id,
        })
    }

    /// Messages for a session, oldest first. Unknown sessions have none.
    pub fn history(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        Ok(self.db.get_messages_by_session(session_id, limit)?)
    }
}

fn new_message(session_id: &str, role: MessageRole, content: &str) -> ChatMessage {
    ChatMessage {
        content: content.to_string(),
        created_at: Utc::now(),
        id: uuid::Uuid::new_v4().to_string(),
        role,
        session_id: session_id.to_string(),
    }
}

/// Pull the assistant's text out of a webhook body. Tries the `output`,
/// `message` and `response` string fields in order, then falls back to the
/// body itself.
pub fn extract_assistant_message(data: &Value) -> String {
    match data {
        Value::Null => EMPTY_REPLY.to_string(),
        Value::String(s) => s.clone(),
        Value::Object(map) => ["output", "message", "response"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| data.to_string()),
        other => other.to_string(),
    }
}
