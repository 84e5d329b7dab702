//! Bearer authentication and caller address resolution.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;

use super::response::ApiError;
use crate::auth::TokenError;
use crate::storage::token_prefix;
use crate::AppState;

/// Rejects requests without a live bearer token. On success the token's
/// `AuthToken` row is placed in the request extensions.
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())?.to_string();

    let record = match state.tokens.validate(&token) {
        Ok(record) => record,
        Err(TokenError::NotFound | TokenError::Expired) => {
            tracing::debug!(token = %token_prefix(&token), "Rejected bearer token");
            return Err(ApiError::unauthorized(
                "INVALID_TOKEN",
                "Invalid or expired token",
            ));
        }
        Err(e) => return Err(ApiError::internal_from("Token validation failed", e)),
    };

    request.extensions_mut().insert(record);
    Ok(next.run(request).await)
}

/// Pull the token out of `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthorized("NO_AUTH_TOKEN", "No authentication token provided"))?;

    let invalid_format = || {
        ApiError::unauthorized(
            "INVALID_AUTH_FORMAT",
            "Invalid authorization format. Use: Bearer <token>",
        )
    };

    let value = value.to_str().map_err(|_| invalid_format())?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(invalid_format()),
    }
}

/// The caller's address. Every proxy appends the address it received the
/// request from, so with `trusted_hops` proxies in front the caller is that
/// many entries left of the socket peer. Entries further left are set by the
/// client and never consulted. `unknown` if no address is known.
pub fn source_address(
    headers: &HeaderMap,
    peer: Option<&ConnectInfo<SocketAddr>>,
    trusted_hops: usize,
) -> String {
    let mut chain: Vec<String> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    chain.push(
        peer.map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    );

    let index = chain.len().saturating_sub(1 + trusted_hops);
    let address = chain.swap_remove(index);

    match address.strip_prefix("::ffff:") {
        Some(v4) => v4.to_string(),
        None => address,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    fn code(err: ApiError) -> &'static str {
        match err {
            ApiError::Fail(_, code, _) => code,
            ApiError::Error(..) => "ERROR",
        }
    }

    #[test]
    fn test_bearer_token_parsing() {
        let ok = headers(&[("authorization", "Bearer auth_abc")]);
        assert_eq!(bearer_token(&ok).unwrap(), "auth_abc");

        assert_eq!(code(bearer_token(&HeaderMap::new()).unwrap_err()), "NO_AUTH_TOKEN");

        for bad in ["auth_abc", "Basic auth_abc", "Bearer", "Bearer a b", "Bearer "] {
            let h = headers(&[("authorization", bad)]);
            assert_eq!(code(bearer_token(&h).unwrap_err()), "INVALID_AUTH_FORMAT", "{bad}");
        }
    }

    #[test]
    fn test_source_address() {
        let peer = ConnectInfo(SocketAddr::from(([192, 168, 1, 7], 40000)));
        let fwd = headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]);

        assert_eq!(source_address(&fwd, Some(&peer), 0), "192.168.1.7");
        assert_eq!(source_address(&fwd, Some(&peer), 1), "10.0.0.1");
        assert_eq!(source_address(&fwd, Some(&peer), 2), "203.0.113.9");
        assert_eq!(source_address(&HeaderMap::new(), Some(&peer), 1), "192.168.1.7");
        assert_eq!(source_address(&HeaderMap::new(), None, 0), "unknown");

        let mapped = headers(&[("x-forwarded-for", "::ffff:198.51.100.4")]);
        assert_eq!(source_address(&mapped, None, 1), "198.51.100.4");
    }

    #[test]
    fn test_client_supplied_hops_are_ignored() {
        let peer = ConnectInfo(SocketAddr::from(([10, 0, 0, 2], 40000)));

        // One proxy appended the real client after whatever the client sent
        for spoofed in ["1.1.1.1", "2.2.2.2, 3.3.3.3", "evil"] {
            let chain = format!("{spoofed}, 198.51.100.77");
            let fwd = headers(&[("x-forwarded-for", chain.as_str())]);
            assert_eq!(source_address(&fwd, Some(&peer), 1), "198.51.100.77");
        }

        // More trusted hops than entries falls back to the left-most one
        let fwd = headers(&[("x-forwarded-for", "198.51.100.77")]);
        assert_eq!(source_address(&fwd, Some(&peer), 5), "198.51.100.77");
    }
}
