//! Event type tags and payloads.
//!
//! Handlers are registered against one of the tag constants below and name the
//! payload type as a generic parameter, e.g. `mux.on::<GuildCreate, _>(GUILD_CREATE, ..)`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConsistencyFault;
use crate::types::{Channel, Emoji, Guild, Member, Role, User};

pub const READY: &str = "READY";
pub const RESUMED: &str = "RESUMED";
pub const GUILD_CREATE: &str = "GUILD_CREATE";
pub const GUILD_UPDATE: &str = "GUILD_UPDATE";
pub const GUILD_DELETE: &str = "GUILD_DELETE";
pub const CHANNEL_CREATE: &str = "CHANNEL_CREATE";
pub const CHANNEL_UPDATE: &str = "CHANNEL_UPDATE";
pub const CHANNEL_DELETE: &str = "CHANNEL_DELETE";
pub const GUILD_MEMBER_ADD: &str = "GUILD_MEMBER_ADD";
pub const GUILD_MEMBER_UPDATE: &str = "GUILD_MEMBER_UPDATE";
pub const GUILD_MEMBER_REMOVE: &str = "GUILD_MEMBER_REMOVE";
pub const GUILD_MEMBERS_CHUNK: &str = "GUILD_MEMBERS_CHUNK";
pub const GUILD_ROLE_CREATE: &str = "GUILD_ROLE_CREATE";
pub const GUILD_ROLE_UPDATE: &str = "GUILD_ROLE_UPDATE";
pub const GUILD_ROLE_DELETE: &str = "GUILD_ROLE_DELETE";
pub const GUILD_EMOJIS_UPDATE: &str = "GUILD_EMOJIS_UPDATE";
pub const USER_UPDATE: &str = "USER_UPDATE";
pub const MESSAGE_CREATE: &str = "MESSAGE_CREATE";
pub const MESSAGE_UPDATE: &str = "MESSAGE_UPDATE";
pub const MESSAGE_DELETE: &str = "MESSAGE_DELETE";
pub const TYPING_START: &str = "TYPING_START";
pub const PRESENCE_UPDATE: &str = "PRESENCE_UPDATE";

/// Connection state transitions, routed locally; never sent by the server.
pub const GATEWAY_STATE: &str = "GATEWAY_STATE";
/// Decode, handler and connection errors, routed locally.
pub const CLIENT_ERROR: &str = "CLIENT_ERROR";

/// One decoded gateway frame, handed to the mux exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    /// Frame opcode
    pub opcode: u8,
    /// Dispatch sequence number
    pub sequence: Option<u64>,
    /// Dispatch event name
    pub type_tag: Option<String>,
    /// Undecoded `d` field
    pub payload: Value,
}

impl EventEnvelope {
    /// A dispatch envelope.
    #[must_use]
    pub fn dispatch(type_tag: impl Into<String>, sequence: Option<u64>, payload: Value) -> Self {
        Self {
            opcode: 0,
            sequence,
            type_tag: Some(type_tag.into()),
            payload,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection health
// ─────────────────────────────────────────────────────────────────────────────

/// Gateway connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingHello,
    Identifying,
    Resuming,
    Connected,
    Reconnecting,
}

/// Payload of [`GATEWAY_STATE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayStateEvent {
    pub state: ConnectionState,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub sequence: Option<u64>,
}

/// Payload of [`CLIENT_ERROR`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientErrorReport {
    /// Error class, e.g. `malformed_event`, `handler`, `consistency_fault`
    pub kind: String,
    pub message: String,
    /// Tag of the event being handled, if any
    #[serde(default)]
    pub type_tag: Option<String>,
    #[serde(default)]
    pub sequence: Option<u64>,
    /// Payload of the event being handled
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub fault: Option<ConsistencyFault>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch payloads
// ─────────────────────────────────────────────────────────────────────────────

/// READY.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ready {
    /// API version
    #[serde(default)]
    pub v: u8,
    pub user: User,
    pub session_id: String,
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
    /// Guilds that will stream in as GUILD_CREATE
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
    #[serde(default)]
    pub private_channels: Vec<Channel>,
}

/// Guild stub from READY, also the GUILD_DELETE payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableGuild {
    pub id: String,
    #[serde(default)]
    pub unavailable: bool,
}

/// GUILD_CREATE: a guild with its child collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildCreate {
    #[serde(flatten)]
    pub guild: Guild,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub emojis: Vec<Emoji>,
    #[serde(default)]
    pub members: Vec<Member>,
}

/// Partial update of an id-keyed entity. Only the fields present are applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityPatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// GUILD_MEMBER_ADD. The user is split out of the member so a frame without one fails to decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildMemberAdd {
    pub guild_id: String,
    pub user: User,
    #[serde(flatten)]
    pub member: Member,
}

/// GUILD_MEMBER_UPDATE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildMemberUpdate {
    pub guild_id: String,
    pub user: User,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// GUILD_MEMBER_REMOVE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildMemberRemove {
    pub guild_id: String,
    pub user: User,
}

/// GUILD_MEMBERS_CHUNK.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildMembersChunk {
    pub guild_id: String,
    pub members: Vec<Member>,
    #[serde(default)]
    pub chunk_index: u32,
    #[serde(default)]
    pub chunk_count: u32,
}

/// GUILD_ROLE_CREATE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildRoleCreate {
    pub guild_id: String,
    pub role: Role,
}

/// GUILD_ROLE_UPDATE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildRoleUpdate {
    pub guild_id: String,
    pub role: EntityPatch,
}

/// GUILD_ROLE_DELETE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildRoleDelete {
    pub guild_id: String,
    pub role_id: String,
}

/// GUILD_EMOJIS_UPDATE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildEmojisUpdate {
    pub guild_id: String,
    pub emojis: Vec<Emoji>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_guild_create_flattens() {
        let payload = json!({
            "id": "10",
            "name": "home",
            "channels": [{"id": "20", "type": 0, "name": "general"}],
            "roles": [{"id": "10", "name": "@everyone"}],
            "member_count": 3
        });

        let event: GuildCreate = serde_json::from_value(payload).unwrap();
        assert_eq!(event.guild.id, "10");
        assert_eq!(event.guild.name, "home");
        assert_eq!(event.channels.len(), 1);
        assert_eq!(event.roles[0].name, "@everyone");
        assert!(event.members.is_empty());
    }

    #[test]
    fn test_patch_keeps_only_present_fields() {
        let patch: EntityPatch =
            serde_json::from_value(json!({"id": "20", "guild_id": "10", "topic": "new"})).unwrap();
        assert_eq!(patch.id, "20");
        assert_eq!(patch.guild_id.as_deref(), Some("10"));
        assert_eq!(patch.fields.len(), 1);
        assert_eq!(patch.fields["topic"], "new");
    }

    #[test]
    fn test_member_add_splits_user() {
        let event: GuildMemberAdd = serde_json::from_value(json!({
            "guild_id": "10",
            "user": {"id": "7", "username": "ana"},
            "nick": "A",
            "roles": ["10"]
        }))
        .unwrap();
        assert_eq!(event.user.id, "7");
        assert!(event.member.user.is_none());
        assert_eq!(event.member.nick.as_deref(), Some("A"));

        let missing = json!({"guild_id": "10", "nick": "A"});
        assert!(serde_json::from_value::<GuildMemberAdd>(missing).is_err());
    }

    #[test]
    fn test_patch_requires_id() {
        assert!(serde_json::from_value::<EntityPatch>(json!({"name": "x"})).is_err());
    }

    #[test]
    fn test_state_event_roundtrip_names() {
        let event = GatewayStateEvent {
            state: ConnectionState::AwaitingHello,
            session_id: None,
            sequence: Some(4),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["state"], "awaiting_hello");
    }
}
