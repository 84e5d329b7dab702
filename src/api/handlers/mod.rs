mod admin;
mod auth;
mod chat;
mod histories;

pub use admin::{health, stats};
pub use auth::{logout, verify};
pub use chat::{get_history, send_message};
pub use histories::{create_history, delete_history, list_histories, rename_history};
