//! Client configuration.

use std::time::Duration;

use dgw_ratelimit::ExponentialBackoff;
use serde::{Deserialize, Serialize};

use crate::error::{DiscordError, DiscordResult};

/// Configuration for the gateway client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token from the Developer Portal. A leading `Bot ` is accepted and stripped.
    pub bot_token: String,

    /// Application ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,

    /// Base URL for the REST API (default: https://discord.com/api/v10)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Gateway URL override. When unset the endpoint is resolved through `GET /gateway/bot`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_url: Option<String>,

    /// Per-request HTTP timeout
    #[serde(default = "default_timeout", with = "duration_ms")]
    pub timeout: Duration,

    /// Gateway intents
    #[serde(default = "default_intents")]
    pub intents: u64,

    /// Shard configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<ShardConfig>,

    /// Gateway reconnect backoff
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// REST quota handling
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Worker pool for worker-dispatched handlers
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Fraction of the heartbeat interval the first heartbeat may be pulled forward by
    #[serde(default = "default_heartbeat_jitter")]
    pub heartbeat_jitter: f64,

    /// How long to wait for Hello after the socket opens
    #[serde(default = "default_hello_timeout", with = "duration_ms")]
    pub hello_timeout: Duration,
}

fn default_api_url() -> String {
    "https://discord.com/api/v10".into()
}

const fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_intents() -> u64 {
    // Guilds, GuildMembers, GuildMessages, DirectMessages, MessageContent
    (1 << 0) | (1 << 1) | (1 << 9) | (1 << 12) | (1 << 15)
}

const fn default_heartbeat_jitter() -> f64 {
    0.1
}

const fn default_hello_timeout() -> Duration {
    Duration::from_secs(20)
}

impl DiscordConfig {
    /// Configuration with defaults and the given token.
    #[must_use]
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            ..Self::default()
        }
    }

    /// Token without any `Bot ` prefix.
    #[must_use]
    pub fn token(&self) -> &str {
        let token = self.bot_token.trim_start();
        token.strip_prefix("Bot ").unwrap_or(token).trim()
    }

    /// Set the REST base URL.
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Pin the gateway URL instead of resolving it.
    #[must_use]
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = Some(url.into());
        self
    }

    /// Set gateway intents.
    #[must_use]
    pub const fn with_intents(mut self, intents: u64) -> Self {
        self.intents = intents;
        self
    }

    /// Set reconnect backoff.
    #[must_use]
    pub const fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set worker pool sizing.
    #[must_use]
    pub const fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Set the first-heartbeat jitter fraction.
    #[must_use]
    pub const fn with_heartbeat_jitter(mut self, jitter: f64) -> Self {
        self.heartbeat_jitter = jitter;
        self
    }

    /// Set the Hello timeout.
    #[must_use]
    pub const fn with_hello_timeout(mut self, timeout: Duration) -> Self {
        self.hello_timeout = timeout;
        self
    }

    /// Check the configuration before connecting.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::Config`] for an empty token, zero workers or a zero-sized queue.
    pub fn validate(&self) -> DiscordResult<()> {
        if self.token().is_empty() {
            return Err(DiscordError::Config("bot_token is empty".into()));
        }
        if self.dispatch.workers == 0 {
            return Err(DiscordError::Config("dispatch.workers must be at least 1".into()));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(DiscordError::Config(
                "dispatch.queue_capacity must be at least 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.heartbeat_jitter) {
            return Err(DiscordError::Config(
                "heartbeat_jitter must be in [0, 1)".into(),
            ));
        }
        Ok(())
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            application_id: None,
            api_url: default_api_url(),
            gateway_url: None,
            timeout: default_timeout(),
            intents: default_intents(),
            shard: None,
            reconnect: ReconnectConfig::default(),
            rate_limit: RateLimitConfig::default(),
            dispatch: DispatchConfig::default(),
            heartbeat_jitter: default_heartbeat_jitter(),
            hello_timeout: default_hello_timeout(),
        }
    }
}

/// Shard configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardConfig {
    /// Shard ID
    pub shard_id: u32,

    /// Total number of shards
    pub shard_count: u32,
}

/// Gateway reconnect backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt
    #[serde(default = "default_initial_delay", with = "duration_ms")]
    pub initial_delay: Duration,

    /// Upper bound on the delay
    #[serde(default = "default_max_delay", with = "duration_ms")]
    pub max_delay: Duration,

    /// Growth factor per failed attempt
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Randomize delays
    #[serde(default = "default_true")]
    pub jitter: bool,
}

const fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

const fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_true() -> bool {
    true
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: true,
        }
    }
}

impl ReconnectConfig {
    /// Backoff schedule for this configuration.
    #[must_use]
    pub const fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.initial_delay, self.max_delay)
            .with_multiplier(self.multiplier)
            .with_jitter(self.jitter)
    }
}

/// REST quota handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Account-wide request ceiling per second
    #[serde(default = "default_global_per_second")]
    pub global_per_second: u32,

    /// Default deadline for a request, including time spent waiting for quota
    #[serde(default, with = "option_duration_ms", skip_serializing_if = "Option::is_none")]
    pub request_deadline: Option<Duration>,
}

const fn default_global_per_second() -> u32 {
    50
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_per_second: default_global_per_second(),
            request_deadline: None,
        }
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Number of worker tasks
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Jobs that may wait for a worker before submissions are rejected
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

const fn default_workers() -> usize {
    4
}

const fn default_queue_capacity() -> usize {
    1024
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod option_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
