//! Mock REST server.
//!
//! Wraps wiremock with the response shapes the client cares about: quota headers on
//! success and 429 bodies carrying `retry_after`.

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A mock REST API.
pub struct MockApiServer {
    server: MockServer,
}

impl MockApiServer {
    /// Start a new mock server.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL of the mock server.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.server.uri()
    }

    /// Underlying wiremock server for advanced configuration.
    #[must_use]
    pub const fn inner(&self) -> &MockServer {
        &self.server
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Response Setup
    // ─────────────────────────────────────────────────────────────────────────────

    /// Respond to `GET /gateway/bot` with the given WebSocket URL.
    pub async fn expect_gateway_bot(&self, ws_url: &str) {
        self.expect_json(
            "GET",
            "/gateway/bot",
            200,
            serde_json::json!({
                "url": ws_url,
                "shards": 1,
                "session_start_limit": {
                    "total": 1000,
                    "remaining": 999,
                    "reset_after": 14_400_000,
                    "max_concurrency": 1
                }
            }),
        )
        .await;
    }

    /// Respond with a JSON body and status.
    pub async fn expect_json(
        &self,
        http_method: &str,
        request_path: &str,
        status: u16,
        body: serde_json::Value,
    ) {
        Mock::given(method(http_method))
            .and(path(request_path))
            .respond_with(json_response(status, body))
            .mount(&self.server)
            .await;
    }

    /// Respond with a JSON body and `x-ratelimit-*` headers.
    pub async fn expect_with_quota(
        &self,
        http_method: &str,
        request_path: &str,
        limit: u32,
        remaining: u32,
        reset_after: Duration,
        body: serde_json::Value,
    ) {
        let response = json_response(200, body)
            .insert_header("x-ratelimit-limit", limit.to_string().as_str())
            .insert_header("x-ratelimit-remaining", remaining.to_string().as_str())
            .insert_header(
                "x-ratelimit-reset-after",
                format!("{:.3}", reset_after.as_secs_f64()).as_str(),
            )
            .insert_header("x-ratelimit-bucket", "mockbucket");

        Mock::given(method(http_method))
            .and(path(request_path))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Answer the next `times` matching requests with a 429.
    ///
    /// These mocks take priority over anything mounted with default priority, so
    /// mounting a success response for the same path afterwards yields
    /// "429 `times` times, then success".
    pub async fn expect_rate_limited(
        &self,
        http_method: &str,
        request_path: &str,
        retry_after: Duration,
        global: bool,
        times: u64,
    ) {
        let secs = retry_after.as_secs_f64();
        let mut response = json_response(
            429,
            serde_json::json!({
                "message": "You are being rate limited.",
                "retry_after": secs,
                "global": global
            }),
        )
        .insert_header("retry-after", format!("{}", secs.ceil()).as_str());
        if global {
            response = response.insert_header("x-ratelimit-global", "true");
        }

        Mock::given(method(http_method))
            .and(path(request_path))
            .respond_with(response)
            .up_to_n_times(times)
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    /// Respond with an API error body.
    pub async fn expect_error(&self, request_path: &str, status: u16, code: u32, message: &str) {
        Mock::given(path(request_path))
            .respond_with(json_response(
                status,
                serde_json::json!({"code": code, "message": message}),
            ))
            .mount(&self.server)
            .await;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Verification
    // ─────────────────────────────────────────────────────────────────────────────

    /// All received requests.
    pub async fn received_requests(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Number of requests received for `request_path`.
    pub async fn request_count(&self, request_path: &str) -> usize {
        self.received_requests()
            .await
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }

    /// Verify that a specific number of requests were received.
    ///
    /// # Panics
    ///
    /// Panics if the count doesn't match.
    pub async fn assert_request_count(&self, expected: usize) {
        let received = self.received_requests().await;
        assert_eq!(
            received.len(),
            expected,
            "Expected {} requests but received {}",
            expected,
            received.len()
        );
    }
}

fn json_response(status: u16, body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .set_body_json(body)
        .insert_header("content-type", "application/json")
}
