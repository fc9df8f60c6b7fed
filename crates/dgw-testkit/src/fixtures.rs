//! Gateway and entity payload fixtures.

use serde_json::{json, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Gateway Frames
// ─────────────────────────────────────────────────────────────────────────────

/// op 10 Hello.
#[must_use]
pub fn hello(heartbeat_interval_ms: u64) -> Value {
    json!({"op": 10, "d": {"heartbeat_interval": heartbeat_interval_ms}, "s": null, "t": null})
}

/// op 11 Heartbeat ACK.
#[must_use]
pub fn heartbeat_ack() -> Value {
    json!({"op": 11, "d": null, "s": null, "t": null})
}

/// op 1 Heartbeat request from the server.
#[must_use]
pub fn heartbeat_request() -> Value {
    json!({"op": 1, "d": null, "s": null, "t": null})
}

/// op 7 Reconnect.
#[must_use]
pub fn reconnect() -> Value {
    json!({"op": 7, "d": null, "s": null, "t": null})
}

/// op 9 Invalid Session.
#[must_use]
pub fn invalid_session(resumable: bool) -> Value {
    json!({"op": 9, "d": resumable, "s": null, "t": null})
}

/// op 0 Dispatch.
#[must_use]
pub fn dispatch(seq: u64, event: &str, data: Value) -> Value {
    json!({"op": 0, "d": data, "s": seq, "t": event})
}

/// READY dispatch.
#[must_use]
pub fn ready(seq: u64, session_id: &str, resume_url: &str, guild_ids: &[&str]) -> Value {
    let guilds: Vec<Value> = guild_ids
        .iter()
        .map(|id| json!({"id": id, "unavailable": true}))
        .collect();
    dispatch(
        seq,
        "READY",
        json!({
            "v": 10,
            "user": user("1000", "dgw-bot"),
            "session_id": session_id,
            "resume_gateway_url": resume_url,
            "guilds": guilds,
            "private_channels": []
        }),
    )
}

/// RESUMED dispatch.
#[must_use]
pub fn resumed(seq: u64) -> Value {
    dispatch(seq, "RESUMED", json!({}))
}

// ─────────────────────────────────────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────────────────────────────────────

/// A user object.
#[must_use]
pub fn user(id: &str, username: &str) -> Value {
    json!({"id": id, "username": username, "discriminator": "0", "bot": false})
}

/// A guild text channel.
#[must_use]
pub fn guild_channel(id: &str, guild_id: &str, name: &str) -> Value {
    json!({"id": id, "type": 0, "guild_id": guild_id, "name": name, "position": 0})
}

/// A DM channel with one recipient.
#[must_use]
pub fn dm_channel(id: &str, recipient_id: &str) -> Value {
    json!({"id": id, "type": 1, "recipients": [user(recipient_id, "friend")]})
}

/// A role.
#[must_use]
pub fn role(id: &str, name: &str) -> Value {
    json!({"id": id, "name": name, "color": 0, "position": 1, "permissions": "0"})
}

/// A guild member.
#[must_use]
pub fn member(user_id: &str, username: &str) -> Value {
    json!({"user": user(user_id, username), "roles": [], "joined_at": "2024-01-01T00:00:00.000000+00:00"})
}

/// A full GUILD_CREATE payload.
#[must_use]
pub fn guild(id: &str, name: &str, channels: &[Value]) -> Value {
    json!({
        "id": id,
        "name": name,
        "owner_id": "1000",
        "roles": [role(id, "@everyone")],
        "emojis": [],
        "channels": channels,
        "members": [],
    })
}

/// A message.
#[must_use]
pub fn message(id: &str, channel_id: &str, content: &str) -> Value {
    json!({
        "id": id,
        "channel_id": channel_id,
        "author": user("2000", "someone"),
        "content": content,
        "timestamp": "2024-01-01T00:00:00.000000+00:00",
        "tts": false,
        "mention_everyone": false,
        "mentions": [],
        "attachments": [],
        "embeds": [],
    })
}
