pub mod generator;
pub mod ledger;
pub mod token_store;
pub mod verifier;

pub use generator::{generate_session_id, generate_token};
pub use ledger::AttemptLedger;
pub use token_store::{TokenError, TokenStore};
pub use verifier::{constant_time_eq, BlockPolicy, CredentialError, CredentialVerifier};
