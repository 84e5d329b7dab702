use redb::TableDefinition;

/// Credential-check log: "{source}|{attempted_us:020}|{uuid}" -> AttemptRecord (msgpack)
pub const PIN_ATTEMPTS: TableDefinition<&str, &[u8]> = TableDefinition::new("pin_attempts");

/// Bearer tokens: token value -> AuthToken (msgpack)
pub const AUTH_TOKENS: TableDefinition<&str, &[u8]> = TableDefinition::new("auth_tokens");

/// Expiration index: "{expires_ms:020}:{token}" -> token value
pub const AUTH_TOKEN_EXPIRY: TableDefinition<&str, &str> =
    TableDefinition::new("auth_token_expiry");

/// Conversation sessions: session id -> ChatSession (msgpack)
pub const CHAT_SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("chat_sessions");

/// Conversation log: "{session_id}|{created_us:020}|{uuid}" -> ChatMessage (msgpack)
pub const CHAT_MESSAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("chat_messages");

/// Named conversations: history id -> ChatHistory (msgpack)
pub const CHAT_HISTORIES: TableDefinition<&str, &[u8]> = TableDefinition::new("chat_histories");
