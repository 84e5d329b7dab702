//! HTTP surface driven through the router without a socket

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use pin_relay::config::Config;
use pin_relay::relay::{ResilientClient, RetryPolicy};
use pin_relay::storage::Database;
use pin_relay::{api, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PIN: &str = "182001";

struct TestApp {
    router: Router,
    _temp: TempDir,
}

/// One trusted proxy in front; the PIN budget is raised so block tests can
/// run past five attempts.
fn setup(webhook_url: &str) -> TestApp {
    setup_with(webhook_url, &[("PIN_RATE_LIMIT_MAX", "100")])
}

fn setup_with(webhook_url: &str, overrides: &[(&'static str, &str)]) -> TestApp {
    let mut vars: HashMap<&str, String> = HashMap::from([
        ("PIN_CODE", PIN.to_string()),
        ("TRUST_PROXY", "1".to_string()),
        ("WEBHOOK_URL", webhook_url.to_string()),
        ("WEBHOOK_TIMEOUT_MS", "2000".to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert(*key, value.to_string());
    }
    let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();

    let temp = TempDir::new().unwrap();
    let db = Database::open(temp.path()).unwrap();
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    let client = ResilientClient::from_http(http, config.webhook.timeout())
        .with_policy(RetryPolicy {
            base_delay: Duration::from_millis(5),
            max_retries: 2,
        });
    let state = Arc::new(AppState::with_client(config, db, client));

    TestApp {
        router: api::create_router(state),
        _temp: temp,
    }
}

impl TestApp {
    async fn call(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, json) = self.send(method, uri, headers, body).await;
        (status, json)
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let response_headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, response_headers, json)
    }

    async fn login(&self, source: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/auth/verify",
                &[("x-forwarded-for", source)],
                Some(json!({"pin": PIN})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["token"].as_str().unwrap().to_string()
    }
}

fn fail_code(body: &Value) -> &str {
    body["data"]["code"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn test_health() {
    let app = setup("http://127.0.0.1:9/hook");
    let (status, body) = app.call(Method::GET, "/health", &[], None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["database"], "connected");
}

#[tokio::test]
async fn test_verify_outcomes() {
    let app = setup("http://127.0.0.1:9/hook");
    let source = [("x-forwarded-for", "203.0.113.1")];

    let (status, body) = app
        .call(Method::POST, "/auth/verify", &source, Some(json!({"secret": PIN})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["expiresIn"], "24h");
    assert!(body["data"]["token"].as_str().unwrap().starts_with("auth_"));

    let (status, body) = app
        .call(Method::POST, "/auth/verify", &source, Some(json!({"secret": "12ab"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "fail");
    assert_eq!(fail_code(&body), "INVALID_PIN_FORMAT");

    let (status, body) = app
        .call(Method::POST, "/auth/verify", &source, Some(json!({"secret": "000000"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(fail_code(&body), "INVALID_PIN");

    // The submitted PIN is checked as-is
    let padded = json!({"pin": format!(" {PIN} ")});
    let (status, body) = app
        .call(Method::POST, "/auth/verify", &source, Some(padded))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(fail_code(&body), "INVALID_PIN_FORMAT");
}

#[tokio::test]
async fn test_five_wrong_pins_block_the_source() {
    let app = setup("http://127.0.0.1:9/hook");
    let source = [("x-forwarded-for", "198.51.100.9")];

    app.login("198.51.100.9").await;

    for _ in 0..5 {
        let (status, _) = app
            .call(Method::POST, "/auth/verify", &source, Some(json!({"pin": "000000"})))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, body) = app
        .call(Method::POST, "/auth/verify", &source, Some(json!({"pin": PIN})))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(fail_code(&body), "PIN_BLOCKED");

    // A different caller is not affected
    app.login("198.51.100.10").await;
}

#[tokio::test]
async fn test_rotating_forwarded_hops_still_block_the_caller() {
    let app = setup("http://127.0.0.1:9/hook");

    // The proxy appends the real caller; the client controls everything before it
    for i in 0..5 {
        let forwarded = format!("10.66.{i}.1, 198.51.100.77");
        let (status, body) = app
            .call(
                Method::POST,
                "/auth/verify",
                &[("x-forwarded-for", forwarded.as_str())],
                Some(json!({"pin": "000000"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(fail_code(&body), "INVALID_PIN");
    }

    let (status, body) = app
        .call(
            Method::POST,
            "/auth/verify",
            &[("x-forwarded-for", "10.66.99.1, 198.51.100.77")],
            Some(json!({"pin": PIN})),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(fail_code(&body), "PIN_BLOCKED");
}

#[tokio::test]
async fn test_forwarded_header_ignored_without_trusted_proxy() {
    let app = setup_with(
        "http://127.0.0.1:9/hook",
        &[("TRUST_PROXY", "0"), ("PIN_RATE_LIMIT_MAX", "100")],
    );

    // With no proxy configured every request is keyed on the socket peer
    for i in 0..5 {
        let forwarded = format!("203.0.113.{i}");
        let (status, _) = app
            .call(
                Method::POST,
                "/auth/verify",
                &[("x-forwarded-for", forwarded.as_str())],
                Some(json!({"pin": "000000"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, body) = app
        .call(
            Method::POST,
            "/auth/verify",
            &[("x-forwarded-for", "203.0.113.200")],
            Some(json!({"pin": PIN})),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(fail_code(&body), "PIN_BLOCKED");
}

#[tokio::test]
async fn test_pin_endpoint_rate_limit() {
    let app = setup_with("http://127.0.0.1:9/hook", &[]);
    let source = [("x-forwarded-for", "198.51.100.40")];

    for remaining in (0..5).rev() {
        let (status, headers, _) = app
            .send(Method::POST, "/auth/verify", &source, Some(json!({"pin": PIN})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["ratelimit-limit"], "5");
        assert_eq!(headers["ratelimit-remaining"], remaining.to_string().as_str());
    }

    let (status, headers, body) = app
        .send(Method::POST, "/auth/verify", &source, Some(json!({"pin": PIN})))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["status"], "fail");
    assert_eq!(fail_code(&body), "RATE_LIMIT_EXCEEDED");
    assert!(headers.contains_key(header::RETRY_AFTER));

    // Budgets are per source
    app.login("198.51.100.41").await;
}

#[tokio::test]
async fn test_chat_endpoint_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": "ok"})))
        .expect(2)
        .mount(&server)
        .await;

    let app = setup_with(&server.uri(), &[("CHAT_RATE_LIMIT_MAX", "2")]);
    let auth = format!("Bearer {}", app.login("192.0.2.60").await);
    let headers = [
        ("authorization", auth.as_str()),
        ("x-forwarded-for", "192.0.2.60"),
    ];

    for _ in 0..2 {
        let (status, body) = app
            .call(Method::POST, "/api/chat", &headers, Some(json!({"message": "hi"})))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    let (status, body) = app
        .call(Method::POST, "/api/chat", &headers, Some(json!({"message": "hi"})))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(fail_code(&body), "RATE_LIMIT_EXCEEDED");

    // Other routes are not budgeted
    let (status, _) = app.call(Method::GET, "/api/stats", &headers, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_body_is_validation_error() {
    let app = setup("http://127.0.0.1:9/hook");
    let (status, body) = app
        .call(Method::POST, "/auth/verify", &[], Some(json!({"code": 1})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fail_code(&body), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_bearer_failures() {
    let app = setup("http://127.0.0.1:9/hook");

    let (status, body) = app.call(Method::GET, "/api/stats", &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(fail_code(&body), "NO_AUTH_TOKEN");

    let (status, body) = app
        .call(Method::GET, "/api/stats", &[("authorization", "Token abc")], None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(fail_code(&body), "INVALID_AUTH_FORMAT");

    let (status, body) = app
        .call(
            Method::GET,
            "/api/stats",
            &[("authorization", "Bearer auth_unknown")],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(fail_code(&body), "INVALID_TOKEN");
}

#[tokio::test]
async fn test_logout_revokes_and_always_succeeds() {
    let app = setup("http://127.0.0.1:9/hook");
    let token = app.login("192.0.2.1").await;
    let auth = format!("Bearer {token}");

    let (status, body) = app
        .call(Method::GET, "/api/stats", &[("authorization", auth.as_str())], None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["activeTokens"], 1);

    let (status, _) = app
        .call(Method::POST, "/auth/logout", &[("authorization", auth.as_str())], None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(Method::GET, "/api/stats", &[("authorization", auth.as_str())], None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(fail_code(&body), "INVALID_TOKEN");

    let (status, _) = app.call(Method::POST, "/auth/logout", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .call(Method::POST, "/auth/logout", &[("authorization", "garbage")], None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_chat_relays_and_persists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook/chat"))
        .and(body_json(json!({"chatInput": "hello", "sessionId": "session-abc"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": "hi there"})))
        .expect(1)
        .mount(&server)
        .await;

    let app = setup(&format!("{}/webhook/chat", server.uri()));
    let auth = format!("Bearer {}", app.login("192.0.2.2").await);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/chat",
            &[("authorization", auth.as_str())],
            Some(json!({"message": "hello", "userId": "session-abc"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["data"]["output"], "hi there");
    assert_eq!(body["data"]["sessionId"], "session-abc");

    let (status, body) = app
        .call(
            Method::GET,
            "/api/chat/history/session-abc",
            &[("authorization", auth.as_str())],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let messages = body["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "hello");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "hi there");

    let (_, body) = app
        .call(
            Method::GET,
            "/api/chat/history/session-abc?limit=1",
            &[("authorization", auth.as_str())],
            None,
        )
        .await;
    assert_eq!(body["data"]["messages"].as_array().unwrap().len(), 1);

    let (_, body) = app
        .call(Method::GET, "/api/stats", &[("authorization", auth.as_str())], None)
        .await;
    assert_eq!(body["data"]["sessions"], 1);
    assert_eq!(body["data"]["messages"], 2);
}

#[tokio::test]
async fn test_chat_upstream_failure_is_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("webhook not registered"))
        .expect(1)
        .mount(&server)
        .await;

    let app = setup(&server.uri());
    let auth = format!("Bearer {}", app.login("192.0.2.3").await);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/chat",
            &[("authorization", auth.as_str())],
            Some(json!({"message": "hello", "sessionId": "session-x"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], "error");
    assert!(!body.to_string().contains("webhook not registered"));

    // The inbound message was stored before the relay failed
    let (_, body) = app
        .call(
            Method::GET,
            "/api/chat/history/session-x",
            &[("authorization", auth.as_str())],
            None,
        )
        .await;
    assert_eq!(body["data"]["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_chat_rejects_empty_message() {
    let app = setup("http://127.0.0.1:9/hook");
    let auth = format!("Bearer {}", app.login("192.0.2.4").await);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/chat",
            &[("authorization", auth.as_str())],
            Some(json!({"message": "   "})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fail_code(&body), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_history_crud() {
    let app = setup("http://127.0.0.1:9/hook");
    let auth = format!("Bearer {}", app.login("192.0.2.5").await);
    let headers = [("authorization", auth.as_str())];

    let (status, body) = app
        .call(
            Method::POST,
            "/api/histories",
            &headers,
            Some(json!({"sessionId": "session-h", "message": "Book a table for two. Tonight."})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["title"], "Book a table for two.");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = app.call(Method::GET, "/api/histories", &headers, None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let uri = format!("/api/histories/{id}");
    let (status, body) = app
        .call(Method::PATCH, &uri, &headers, Some(json!({"title": "Dinner"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Dinner");

    let (status, body) = app
        .call(Method::PATCH, &uri, &headers, Some(json!({"title": " "})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fail_code(&body), "VALIDATION_ERROR");

    let (status, _) = app.call(Method::DELETE, &uri, &headers, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.call(Method::DELETE, &uri, &headers, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(fail_code(&body), "NOT_FOUND");
}
