pub mod histories;
pub mod relay;

pub use histories::{generate_title, validate_title, ChatHistories, HistoryError};
pub use relay::{extract_assistant_message, ChatError, ChatRelay, ChatReply};
