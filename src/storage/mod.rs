mod attempts;
pub mod db;
mod histories;
mod messages;
pub mod models;
mod sessions;
mod tables;
mod tokens;

pub use db::{Database, DatabaseError, StoreCounts};
pub use tables::*;
pub use tokens::token_prefix;
