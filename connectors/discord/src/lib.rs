//! Discord gateway client.
//!
//! Four parts, usable separately or through [`DiscordClient`]:
//! - [`RateLimitedTransport`]: REST calls that respect per-route and global quotas
//! - [`GatewayConnection`]: the WebSocket session with heartbeat, resume and reconnect
//! - [`EventMux`]: routes dispatches to typed handlers, inline or on a worker pool
//! - [`StateCache`]: a consistent in-memory view of guilds, channels, members and roles
//!
//! ```no_run
//! use dgw_discord::{events, DiscordClient, DiscordConfig, DrainPolicy, Message};
//!
//! # async fn demo() -> dgw_discord::DiscordResult<()> {
//! let client = DiscordClient::new(DiscordConfig::new("token").with_intents(1 << 9))?;
//! client.on(events::MESSAGE_CREATE, |message: Message| {
//!     println!("{} in {}", message.content, message.channel_id);
//!     Ok(())
//! });
//!
//! let gateway = client.connect();
//! tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//! gateway.shutdown(DrainPolicy::Drain).await
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod heartbeat;
pub mod mux;
pub mod session;
pub mod transport;
pub mod types;
pub mod worker;

pub use api::DiscordApiClient;
pub use cache::{CacheStats, StateCache};
pub use client::{DiscordClient, GatewayHandle};
pub use config::{DiscordConfig, DispatchConfig, RateLimitConfig, ReconnectConfig, ShardConfig};
pub use error::{ConsistencyFault, DiscordError, DiscordResult, EntityKind, FaultKind};
pub use events::{ClientErrorReport, ConnectionState, EventEnvelope, GatewayStateEvent};
pub use gateway::{GatewayConnection, GatewayOpcode};
pub use mux::{EventMux, ExecutionMode};
pub use session::Session;
pub use transport::{ApiResponse, RateLimitedTransport, RequestSpec};
pub use types::*;
pub use worker::{DrainPolicy, SubmitError, WorkerPool};
