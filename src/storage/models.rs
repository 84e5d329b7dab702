use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device kind detected from User-Agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DeviceKind {
    Bot,
    Desktop,
    Mobile,
    Tablet,
    #[default]
    Unknown,
}

/// Information about the client that requested a token
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeviceInfo {
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub kind: DeviceKind,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub raw_user_agent: String,
}

/// One credential check. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempted_at: DateTime<Utc>,
    pub source_address: String,
    pub success: bool,
}

/// A bearer token issued after a successful PIN check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Client descriptor at issuance (advisory)
    pub issued_agent: Option<DeviceInfo>,
    /// Source address at issuance (advisory)
    pub issued_from: Option<String>,
    /// Caller-visible session identifier
    pub session_id: String,
    /// Opaque secret value presented as `Authorization: Bearer <token>`
    pub token: String,
}

impl AuthToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A conversation session, created lazily on first use of its id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub message_count: u64,
    pub session_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Assistant,
    User,
}

/// A single persisted chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub id: String,
    pub role: MessageRole,
    pub session_id: String,
}

/// A titled conversation shown in the history sidebar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistory {
    pub created_at: DateTime<Utc>,
    pub id: String,
    pub session_id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}
