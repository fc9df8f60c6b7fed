//! Rate-limited REST transport.
//!
//! Every REST call leaves the process through [`RateLimitedTransport::send`]. The
//! transport waits for quota on the route bucket and the global bucket, performs
//! the request, then feeds the response headers back so the next caller sees
//! what the server reported.

use std::time::Duration;

use dgw_ratelimit::{Bucket, BucketRegistry, QuotaHeaders, RateLimitError, RouteKey};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::config::DiscordConfig;
use crate::error::{DiscordError, DiscordResult};

/// Used when a 429 carries no usable delay.
const FALLBACK_RETRY_AFTER: Duration = Duration::from_secs(1);

/// One REST request.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,

    /// Path below the API base, with ids filled in, e.g. `/channels/123/messages`
    pub path: String,

    /// JSON body
    pub body: Option<Value>,

    /// Give up if quota does not free up before this instant
    pub deadline: Option<Instant>,

    /// Audit log reason
    pub reason: Option<String>,
}

impl RequestSpec {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            deadline: None,
            reason: None,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    #[must_use]
    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, path).with_body(body)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub const fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline relative to now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Rate-limit identity of this request.
    #[must_use]
    pub fn route_key(&self) -> RouteKey {
        RouteKey::new(self.method.as_str(), &self.path)
    }
}

/// A successful response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub quota: QuotaHeaders,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Decode the body. An empty body decodes as JSON `null`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::Json`] if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> DiscordResult<T> {
        if self.body.is_empty() {
            return Ok(serde_json::from_value(Value::Null)?);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitBody {
    #[serde(default)]
    retry_after: Option<f64>,
    #[serde(default)]
    global: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// REST transport that honors server-reported quotas.
#[derive(Debug)]
pub struct RateLimitedTransport {
    client: Client,
    base_url: String,
    token: String,
    registry: BucketRegistry,
    default_deadline: Option<Duration>,
}

impl RateLimitedTransport {
    /// Create a transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &DiscordConfig) -> DiscordResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(format!("dgw-discord/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token().to_string(),
            registry: BucketRegistry::new(config.rate_limit.global_per_second),
            default_deadline: config.rate_limit.request_deadline,
        })
    }

    /// Bucket state, for inspection.
    #[must_use]
    pub fn registry(&self) -> &BucketRegistry {
        &self.registry
    }

    /// Send a request, waiting for quota first.
    ///
    /// A 429 is waited out and retried once.
    ///
    /// # Errors
    ///
    /// - [`DiscordError::Timeout`] if quota does not free up before the deadline
    /// - [`DiscordError::RateLimited`] on a second consecutive 429
    /// - [`DiscordError::Transport`] if no response arrived; buckets are left untouched
    /// - [`DiscordError::Api`] for any other non-success status
    #[instrument(skip_all, fields(route = %route))]
    pub async fn send(&self, route: &RouteKey, spec: RequestSpec) -> DiscordResult<ApiResponse> {
        let started = Instant::now();
        let deadline = spec
            .deadline
            .or_else(|| self.default_deadline.map(|timeout| started + timeout));
        let bucket = self.registry.bucket(route);
        let global = self.registry.global();
        let route_name = route.to_string();
        let mut limited_once = false;

        loop {
            self.admit(&bucket, &global, &route_name, deadline, started)
                .await?;

            let response = self.execute(&spec).await?;
            let status = response.status();
            let quota = QuotaHeaders::from_pairs(
                response
                    .headers()
                    .iter()
                    .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?))),
            );
            let body = response.bytes().await?.to_vec();
            dgw_telemetry::metrics::record_http_request(&route_name, status.as_u16());

            if status == StatusCode::TOO_MANY_REQUESTS {
                let info: RateLimitBody = serde_json::from_slice(&body).unwrap_or_default();
                let retry_after = info
                    .retry_after
                    .filter(|secs| secs.is_finite() && *secs >= 0.0)
                    .map(Duration::from_secs_f64)
                    .or(quota.retry_after)
                    .or_else(|| quota.reset_in())
                    .unwrap_or(FALLBACK_RETRY_AFTER);
                let is_global = info.global || quota.global;
                dgw_telemetry::metrics::record_rate_limited(&route_name, is_global);

                if is_global {
                    global.block_for(retry_after);
                } else {
                    bucket.update(&quota);
                    bucket.block_for(retry_after);
                }

                if limited_once {
                    warn!(
                        retry_after_ms = retry_after.as_millis(),
                        global = is_global,
                        "Rate limited twice, giving up"
                    );
                    return Err(DiscordError::RateLimited {
                        route: route_name,
                        retry_after,
                        global: is_global,
                    });
                }
                limited_once = true;

                if deadline.is_some_and(|deadline| Instant::now() + retry_after > deadline) {
                    return Err(DiscordError::Timeout {
                        route: route_name,
                        waited: started.elapsed(),
                    });
                }

                warn!(
                    retry_after_ms = retry_after.as_millis(),
                    global = is_global,
                    "Rate limited, retrying once"
                );
                continue;
            }

            bucket.update(&quota);

            if !status.is_success() {
                return Err(api_error(status, &body));
            }

            debug!(status = status.as_u16(), bytes = body.len(), "Request complete");
            return Ok(ApiResponse {
                status: status.as_u16(),
                quota,
                body,
            });
        }
    }

    /// Send and decode the response body.
    ///
    /// # Errors
    ///
    /// See [`Self::send`]; also [`DiscordError::Json`] if the body does not decode.
    pub async fn request<T: DeserializeOwned>(&self, spec: RequestSpec) -> DiscordResult<T> {
        let route = spec.route_key();
        self.send(&route, spec).await?.json()
    }

    /// Send and discard the response body.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn request_empty(&self, spec: RequestSpec) -> DiscordResult<()> {
        let route = spec.route_key();
        self.send(&route, spec).await.map(|_| ())
    }

    async fn admit(
        &self,
        bucket: &Bucket,
        global: &Bucket,
        route: &str,
        deadline: Option<Instant>,
        started: Instant,
    ) -> DiscordResult<()> {
        let timeout = |err: RateLimitError| {
            debug!(error = %err, "Quota wait would pass the deadline");
            DiscordError::Timeout {
                route: route.to_string(),
                waited: started.elapsed(),
            }
        };

        let mut waited = bucket.acquire(deadline).await.map_err(&timeout)?;
        match global.acquire(deadline).await {
            Ok(global_wait) => waited += global_wait,
            Err(err) => {
                // The route slot was never spent on the wire.
                bucket.release();
                return Err(timeout(err));
            }
        }

        if !waited.is_zero() {
            dgw_telemetry::metrics::record_rate_limit_wait(route, waited);
        }
        Ok(())
    }

    async fn execute(&self, spec: &RequestSpec) -> DiscordResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, spec.path);
        let mut request = self
            .client
            .request(spec.method.clone(), &url)
            .header("Authorization", format!("Bot {}", self.token));

        if let Some(body) = &spec.body {
            request = request.json(body);
        }
        if let Some(reason) = &spec.reason {
            request = request.header("X-Audit-Log-Reason", reason);
        }

        Ok(request.send().await?)
    }
}

fn api_error(status: StatusCode, body: &[u8]) -> DiscordError {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
    DiscordError::Api {
        status: status.as_u16(),
        code: parsed.code.unwrap_or_else(|| i64::from(status.as_u16())),
        message: parsed.message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .map_or_else(|| String::from_utf8_lossy(body).into_owned(), str::to_string)
        }),
    }
}
