//! dgw Rate Limit - server-driven quota buckets for the REST transport
//!
//! The remote API tells the client how much capacity is left after every response.
//! This crate keeps a local mirror of that state so callers can be held back *before*
//! a request is sent instead of after the server rejects it:
//!
//! - **Routes**: [`RouteKey`] normalizes request paths so ids share a bucket
//! - **Buckets**: [`Bucket`] tracks `remaining` / `limit` / `reset_at` per route
//! - **Registry**: [`BucketRegistry`] creates route buckets lazily and owns the global bucket
//! - **Header Parsing**: [`QuotaHeaders`] reads `x-ratelimit-*` and `retry-after`
//! - **Backoff**: [`ExponentialBackoff`] for reconnect loops
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use dgw_ratelimit::{BucketRegistry, RouteKey};
//!
//! let registry = BucketRegistry::new(50);
//! let key = RouteKey::new("POST", "/channels/1234/messages");
//!
//! registry.global().acquire(None).await?;
//! registry.bucket(&key).acquire(None).await?;
//! // ... perform the request, then feed the response headers back:
//! registry.bucket(&key).update(&QuotaHeaders::parse(&headers));
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod backoff;
mod bucket;
mod headers;
mod registry;
mod route;

pub use backoff::*;
pub use bucket::*;
pub use headers::*;
pub use registry::*;
pub use route::*;

use std::time::Duration;

/// Rate limiter state snapshot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RateLimitState {
    /// Maximum requests allowed in the window, if the server has reported one.
    pub limit: Option<u32>,

    /// Remaining requests in the current window.
    pub remaining: u32,

    /// Time until the window resets.
    pub reset_after: Duration,

    /// Whether a caller arriving now would have to wait.
    pub is_limited: bool,
}

/// Rate limit error.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Waiting for the bucket to reset would pass the caller's deadline.
    #[error("Wait time {wait_time:?} exceeds maximum {max_wait:?}")]
    WaitExceeded {
        /// Required wait time.
        wait_time: Duration,
        /// Maximum allowed wait.
        max_wait: Duration,
    },

    /// Invalid configuration.
    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfig(String),
}
