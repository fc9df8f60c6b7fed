//! Rate-limit route identity.
//!
//! Two requests share a bucket when they use the same method and their paths only
//! differ in resource identifiers.

use std::fmt;

/// Placeholder that replaces numeric resource ids in a route template.
pub const ID_WILDCARD: &str = "{id}";

/// Placeholder for opaque path segments (emoji names, webhook tokens).
pub const OPAQUE_WILDCARD: &str = "{*}";

/// Bucket identity: HTTP method plus normalized path template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    method: String,
    template: String,
}

impl RouteKey {
    /// Build a key from a concrete request path.
    ///
    /// The query string is ignored. Snowflake-like numeric segments become
    /// [`ID_WILDCARD`]; the segment after `reactions` and the token after a webhook id
    /// become [`OPAQUE_WILDCARD`].
    #[must_use]
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            template: normalize_path(path),
        }
    }

    /// HTTP method, upper-cased.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Normalized path template.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.template)
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    let mut out: Vec<&str> = Vec::new();

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let previous = out.last().copied();
        let before_previous = out.len().checked_sub(2).map(|i| out[i]);

        let normalized = if is_id(segment) {
            ID_WILDCARD
        } else if previous == Some("reactions") && segment != "@me" {
            OPAQUE_WILDCARD
        } else if before_previous == Some("webhooks") && previous == Some(ID_WILDCARD) {
            OPAQUE_WILDCARD
        } else {
            segment
        };
        out.push(normalized);
    }

    let mut template = String::with_capacity(path.len());
    for segment in out {
        template.push('/');
        template.push_str(segment);
    }
    if template.is_empty() {
        template.push('/');
    }
    template
}

fn is_id(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_share_a_key() {
        let a = RouteKey::new("post", "/channels/111/messages");
        let b = RouteKey::new("POST", "/channels/222/messages");
        assert_eq!(a, b);
        assert_eq!(a.template(), "/channels/{id}/messages");
        assert_eq!(a.method(), "POST");
    }

    #[test]
    fn test_trailing_id_normalized() {
        let a = RouteKey::new("DELETE", "/channels/1/messages/900");
        let b = RouteKey::new("DELETE", "/channels/1/messages/901");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "DELETE /channels/{id}/messages/{id}");
    }

    #[test]
    fn test_method_distinguishes() {
        let get = RouteKey::new("GET", "/channels/1");
        let patch = RouteKey::new("PATCH", "/channels/1");
        assert_ne!(get, patch);
    }

    #[test]
    fn test_query_and_slashes_ignored() {
        let key = RouteKey::new("GET", "/guilds/42/members/?limit=100");
        assert_eq!(key.template(), "/guilds/{id}/members");
        assert_eq!(RouteKey::new("GET", "").template(), "/");
    }

    #[test]
    fn test_opaque_segments() {
        let key = RouteKey::new("PUT", "/channels/1/messages/2/reactions/%F0%9F%91%8D/@me");
        assert_eq!(key.template(), "/channels/{id}/messages/{id}/reactions/{*}/@me");

        let hook = RouteKey::new("POST", "/webhooks/77/abcDEF-token");
        assert_eq!(hook.template(), "/webhooks/{id}/{*}");
    }

    #[test]
    fn test_named_segments_kept() {
        let key = RouteKey::new("GET", "/users/@me/guilds");
        assert_eq!(key.template(), "/users/@me/guilds");
        assert_eq!(RouteKey::new("GET", "/gateway/bot").template(), "/gateway/bot");
    }
}
