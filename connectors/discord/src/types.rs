//! API and gateway wire types.

use serde::{Deserialize, Serialize};

/// User.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID
    pub id: String,

    /// Username
    #[serde(default)]
    pub username: String,

    /// Discriminator (legacy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,

    /// Global display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_name: Option<String>,

    /// Avatar hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,

    /// Whether this is a bot
    #[serde(default)]
    pub bot: bool,
}

/// Guild (server) attributes, without its child collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    /// Guild ID
    pub id: String,

    /// Guild name
    #[serde(default)]
    pub name: String,

    /// Icon hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Owner ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    /// Whether the guild is in an outage or not yet streamed
    #[serde(default)]
    pub unavailable: bool,
}

/// Channel type: guild text.
pub const CHANNEL_GUILD_TEXT: i32 = 0;
/// Channel type: direct message.
pub const CHANNEL_DM: i32 = 1;
/// Channel type: group direct message.
pub const CHANNEL_GROUP_DM: i32 = 3;

/// Channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel ID
    pub id: String,

    /// Channel type
    #[serde(rename = "type")]
    pub channel_type: i32,

    /// Guild ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,

    /// Channel name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Topic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Sort position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,

    /// Category ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Recipients of a DM
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<User>,
}

impl Channel {
    /// Whether this is a direct or group message channel.
    #[must_use]
    pub const fn is_private(&self) -> bool {
        matches!(self.channel_type, CHANNEL_DM | CHANNEL_GROUP_DM)
    }
}

/// Guild role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role ID
    pub id: String,

    /// Role name
    #[serde(default)]
    pub name: String,

    /// RGB color
    #[serde(default)]
    pub color: u32,

    /// Sort position
    #[serde(default)]
    pub position: i64,

    /// Permission bit set, as a decimal string
    #[serde(default)]
    pub permissions: String,
}

/// Custom guild emoji.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    /// Emoji ID
    pub id: String,

    /// Emoji name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Whether the emoji is animated
    #[serde(default)]
    pub animated: bool,
}

/// Guild member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// The member's user. Absent on members held in the cache, which keeps users separately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,

    /// Guild nickname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,

    /// Role IDs
    #[serde(default)]
    pub roles: Vec<String>,

    /// Join timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<String>,
}

/// Message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message ID
    pub id: String,

    /// Channel ID
    pub channel_id: String,

    /// Author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,

    /// Message content
    #[serde(default)]
    pub content: String,

    /// Timestamp
    #[serde(default)]
    pub timestamp: String,

    /// Guild ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,

    /// Embeds
    #[serde(default)]
    pub embeds: Vec<Embed>,
}

/// Embed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Embed {
    /// Title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
}

/// Create message request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateMessage {
    /// Message content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Embeds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,

    /// Message reference (for replies)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_reference: Option<MessageReference>,
}

impl CreateMessage {
    /// Plain text message.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Reply to `message_id`.
    #[must_use]
    pub fn reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.message_reference = Some(MessageReference {
            message_id: message_id.into(),
        });
        self
    }
}

/// Message reference for replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReference {
    /// Message ID to reply to
    pub message_id: String,
}

/// `GET /gateway/bot` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayBot {
    /// WebSocket URL
    pub url: String,

    /// Recommended shard count
    #[serde(default)]
    pub shards: u32,

    /// Identify budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_start_limit: Option<SessionStartLimit>,
}

/// Identify budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartLimit {
    pub total: u32,
    pub remaining: u32,
    pub reset_after: u64,
    #[serde(default)]
    pub max_concurrency: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway frames
// ─────────────────────────────────────────────────────────────────────────────

/// Gateway frame envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload {
    /// Opcode
    pub op: u8,

    /// Event data
    #[serde(default)]
    pub d: Option<serde_json::Value>,

    /// Sequence number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

/// Identify payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayIdentify {
    /// Bot token
    pub token: String,

    /// Gateway intents
    pub intents: u64,

    /// Connection properties
    pub properties: GatewayProperties,

    /// Shard info
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,
}

/// Connection properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayProperties {
    /// OS
    pub os: String,

    /// Browser
    pub browser: String,

    /// Device
    pub device: String,
}

/// Resume payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResume {
    /// Bot token
    pub token: String,

    /// Session to resume
    pub session_id: String,

    /// Last sequence received
    pub seq: u64,
}

/// Hello payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayHello {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}
