use chrono::Utc;
use rand::Rng;

/// Generate a bearer token: `auth_` followed by 32 random bytes, hex encoded
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    format!("auth_{}", hex::encode(bytes))
}

/// Generate a caller-visible session id: `session-{unix_ms}-{8 hex chars}`
pub fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 4] = rng.gen();
    format!(
        "session-{}-{}",
        Utc::now().timestamp_millis(),
        hex::encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token() {
        let token = generate_token();
        assert!(token.starts_with("auth_"));
        assert_eq!(token.len(), 5 + 64);
        assert!(token[5..].chars().all(|c| c.is_ascii_hexdigit()));

        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_generate_session_id() {
        let id = generate_session_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "session");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
    }
}
