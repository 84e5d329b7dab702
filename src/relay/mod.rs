pub mod client;
pub mod error;

pub use client::{RelayResponse, ResilientClient, RetryPolicy};
pub use error::RelayError;
