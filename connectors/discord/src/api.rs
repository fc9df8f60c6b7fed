//! REST API bindings.
//!
//! Each method builds a [`RequestSpec`] and goes through the shared transport, so
//! every call shares the same quota buckets.

use std::sync::Arc;

use crate::{
    error::DiscordResult,
    transport::{RateLimitedTransport, RequestSpec},
    types::{Channel, CreateMessage, GatewayBot, Guild, Message, User},
};

/// Discord REST API client.
#[derive(Debug, Clone)]
pub struct DiscordApiClient {
    transport: Arc<RateLimitedTransport>,
}

impl DiscordApiClient {
    #[must_use]
    pub const fn new(transport: Arc<RateLimitedTransport>) -> Self {
        Self { transport }
    }

    /// The underlying transport, for requests without a binding.
    #[must_use]
    pub fn transport(&self) -> &RateLimitedTransport {
        &self.transport
    }

    // ─────────────────────────────────────────────────────────────────────────
    // User endpoints
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the current bot user.
    pub async fn get_current_user(&self) -> DiscordResult<User> {
        self.transport.request(RequestSpec::get("/users/@me")).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Channel endpoints
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a channel by ID.
    pub async fn get_channel(&self, channel_id: &str) -> DiscordResult<Channel> {
        self.transport
            .request(RequestSpec::get(format!("/channels/{channel_id}")))
            .await
    }

    /// Create a message in a channel.
    pub async fn create_message(
        &self,
        channel_id: &str,
        message: &CreateMessage,
    ) -> DiscordResult<Message> {
        let body = serde_json::to_value(message)?;
        self.transport
            .request(RequestSpec::post(
                format!("/channels/{channel_id}/messages"),
                body,
            ))
            .await
    }

    /// Delete a message.
    pub async fn delete_message(&self, channel_id: &str, message_id: &str) -> DiscordResult<()> {
        self.transport
            .request_empty(RequestSpec::delete(format!(
                "/channels/{channel_id}/messages/{message_id}"
            )))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Guild endpoints
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a guild by ID.
    pub async fn get_guild(&self, guild_id: &str) -> DiscordResult<Guild> {
        self.transport
            .request(RequestSpec::get(format!("/guilds/{guild_id}")))
            .await
    }

    /// Get guild channels.
    pub async fn get_guild_channels(&self, guild_id: &str) -> DiscordResult<Vec<Channel>> {
        self.transport
            .request(RequestSpec::get(format!("/guilds/{guild_id}/channels")))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Gateway
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve the gateway endpoint.
    pub async fn get_gateway_bot(&self) -> DiscordResult<GatewayBot> {
        self.transport.request(RequestSpec::get("/gateway/bot")).await
    }
}
