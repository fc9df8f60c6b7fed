//! Client error types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client errors.
#[derive(Error, Debug)]
pub enum DiscordError {
    /// HTTP request failed before a response arrived
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// API returned a non-success status
    #[error("API error {status} (code {code}): {message}")]
    Api {
        status: u16,
        code: i64,
        message: String,
    },

    /// Two consecutive 429 responses
    #[error("Rate limited on {route}, retry after {retry_after:?}")]
    RateLimited {
        route: String,
        retry_after: Duration,
        global: bool,
    },

    /// Quota did not free up before the caller's deadline
    #[error("Timed out on {route} after waiting {waited:?}")]
    Timeout { route: String, waited: Duration },

    /// Dispatch payload did not decode into the handler's type
    #[error("Malformed {type_tag} event: {source}")]
    MalformedEvent {
        type_tag: String,
        #[source]
        source: serde_json::Error,
    },

    /// A handler failed or panicked
    #[error("Handler for {type_tag} failed: {message}")]
    Handler {
        type_tag: String,
        sequence: Option<u64>,
        message: String,
    },

    /// Server broke the handshake or framing rules
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Event contradicted the cached state
    #[error("Consistency fault: {0}")]
    ConsistencyFault(ConsistencyFault),

    /// Server closed the session with a code that forbids reconnecting
    #[error("Gateway closed with fatal code {code}: {reason}")]
    FatalClose { code: u16, reason: String },

    /// Generic gateway error
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DiscordError {
    /// Error for a handler to return.
    #[must_use]
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            type_tag: String::new(),
            sequence: None,
            message: message.into(),
        }
    }

    /// Check if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_)
            | Self::WebSocket(_)
            | Self::RateLimited { .. }
            | Self::Timeout { .. }
            | Self::ProtocolViolation(_)
            | Self::Gateway(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Get the suggested retry delay.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Short stable name of the error class, used in reports and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Json(_) => "json",
            Self::WebSocket(_) => "websocket",
            Self::Api { .. } => "api",
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout { .. } => "timeout",
            Self::MalformedEvent { .. } => "malformed_event",
            Self::Handler { .. } => "handler",
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::ConsistencyFault(_) => "consistency_fault",
            Self::FatalClose { .. } => "fatal_close",
            Self::Gateway(_) => "gateway",
            Self::Config(_) => "config",
        }
    }
}

impl From<ConsistencyFault> for DiscordError {
    fn from(fault: ConsistencyFault) -> Self {
        Self::ConsistencyFault(fault)
    }
}

/// Result type for client operations.
pub type DiscordResult<T> = Result<T, DiscordError>;

/// Cached entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Guild,
    Channel,
    Member,
    Role,
    Emoji,
    User,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Guild => "guild",
            Self::Channel => "channel",
            Self::Member => "member",
            Self::Role => "role",
            Self::Emoji => "emoji",
            Self::User => "user",
        };
        f.write_str(name)
    }
}

/// What the event contradicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// A create or update named a parent the cache does not hold.
    UnknownParent,
    /// An update named an entity the cache does not hold.
    UnknownEntity,
}

/// An event that could not be applied to the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyFault {
    pub kind: FaultKind,
    pub entity: EntityKind,
    pub id: String,
    /// Parent guild id, when the entity lives under one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl ConsistencyFault {
    /// The entity's parent is not cached.
    #[must_use]
    pub fn unknown_parent(entity: EntityKind, id: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::UnknownParent,
            entity,
            id: id.into(),
            parent: Some(parent.into()),
        }
    }

    /// The entity itself is not cached.
    #[must_use]
    pub fn unknown_entity(entity: EntityKind, id: impl Into<String>, parent: Option<String>) -> Self {
        Self {
            kind: FaultKind::UnknownEntity,
            entity,
            id: id.into(),
            parent,
        }
    }
}

impl fmt::Display for ConsistencyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.parent) {
            (FaultKind::UnknownParent, Some(parent)) => {
                write!(f, "{} {} references unknown guild {parent}", self.entity, self.id)
            }
            (FaultKind::UnknownParent, None) => {
                write!(f, "{} {} references an unknown parent", self.entity, self.id)
            }
            (FaultKind::UnknownEntity, Some(parent)) => {
                write!(f, "unknown {} {} in guild {parent}", self.entity, self.id)
            }
            (FaultKind::UnknownEntity, None) => write!(f, "unknown {} {}", self.entity, self.id),
        }
    }
}

impl std::error::Error for ConsistencyFault {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        let limited = DiscordError::RateLimited {
            route: "GET /channels/{id}".into(),
            retry_after: Duration::from_millis(1500),
            global: false,
        };
        assert!(limited.is_retryable());
        assert_eq!(limited.retry_after(), Some(Duration::from_millis(1500)));

        let server = DiscordError::Api {
            status: 502,
            code: 0,
            message: "Bad Gateway".into(),
        };
        assert!(server.is_retryable());

        let missing = DiscordError::Api {
            status: 404,
            code: 10003,
            message: "Unknown Channel".into(),
        };
        assert!(!missing.is_retryable());
        assert!(missing.retry_after().is_none());

        assert!(!DiscordError::handler("boom").is_retryable());
    }

    #[test]
    fn test_fault_display() {
        let fault = ConsistencyFault::unknown_parent(EntityKind::Channel, "20", "10");
        assert_eq!(fault.to_string(), "channel 20 references unknown guild 10");

        let err: DiscordError = fault.clone().into();
        assert_eq!(err.kind(), "consistency_fault");
        assert!(err.to_string().contains("unknown guild 10"));

        let missing = ConsistencyFault::unknown_entity(EntityKind::Guild, "10", None);
        assert_eq!(missing.to_string(), "unknown guild 10");
    }

    #[test]
    fn test_fault_serializes() {
        let fault = ConsistencyFault::unknown_parent(EntityKind::Role, "3", "1");
        let value = serde_json::to_value(&fault).unwrap();
        assert_eq!(value["kind"], "unknown_parent");
        assert_eq!(value["entity"], "role");
        assert_eq!(value["parent"], "1");
    }
}
