//! Quota header parsing.
//!
//! Reads the `x-ratelimit-*` family and `retry-after` from an HTTP response.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Quota information reported by the server on a single response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuotaHeaders {
    /// Maximum requests allowed in the window.
    pub limit: Option<u32>,

    /// Remaining requests in the current window.
    pub remaining: Option<u32>,

    /// Time until the window resets (`x-ratelimit-reset-after`).
    pub reset_after: Option<Duration>,

    /// Absolute reset time as fractional epoch seconds (`x-ratelimit-reset`).
    pub reset_at_epoch: Option<f64>,

    /// Server-side bucket hash.
    pub bucket: Option<String>,

    /// Whether the response concerns the account-wide limit.
    pub global: bool,

    /// Retry delay from a 429 response.
    pub retry_after: Option<Duration>,

    /// Limit scope (`user`, `global`, `shared`).
    pub scope: Option<String>,
}

impl QuotaHeaders {
    /// Parse from a map keyed by header name. Names are matched case-insensitively.
    #[must_use]
    pub fn parse(headers: &HashMap<String, String>) -> Self {
        Self::from_pairs(headers.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Parse from header name/value pairs.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut result = Self::default();

        for (name, value) in pairs {
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                "x-ratelimit-limit" => result.limit = value.parse().ok(),
                "x-ratelimit-remaining" => result.remaining = value.parse().ok(),
                "x-ratelimit-reset-after" => result.reset_after = parse_secs(value),
                "x-ratelimit-reset" => {
                    result.reset_at_epoch = value.parse::<f64>().ok().filter(|v| v.is_finite());
                }
                "x-ratelimit-bucket" => result.bucket = Some(value.to_string()),
                "x-ratelimit-global" => result.global = value.eq_ignore_ascii_case("true"),
                "x-ratelimit-scope" => {
                    if value.eq_ignore_ascii_case("global") {
                        result.global = true;
                    }
                    result.scope = Some(value.to_string());
                }
                "retry-after" => result.retry_after = parse_secs(value),
                _ => {}
            }
        }

        result
    }

    /// Whether any quota information was present.
    #[must_use]
    pub const fn has_quota(&self) -> bool {
        self.limit.is_some() || self.remaining.is_some()
    }

    /// Time until reset, preferring the relative header over the absolute one.
    #[must_use]
    pub fn reset_in(&self) -> Option<Duration> {
        if let Some(after) = self.reset_after {
            return Some(after);
        }

        let at = self.reset_at_epoch?;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs_f64();
        Some(Duration::from_secs_f64((at - now).max(0.0)))
    }

    /// Whether the window has no capacity left.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// Parse a seconds value that may carry a fractional part (`"1.250"`).
#[must_use]
pub fn parse_secs(value: &str) -> Option<Duration> {
    let secs = value.trim().parse::<f64>().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs))
}
