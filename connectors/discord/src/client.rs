//! Client facade wiring transport, gateway, mux and cache together.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    api::DiscordApiClient,
    cache::StateCache,
    config::DiscordConfig,
    error::{DiscordError, DiscordResult},
    events::ConnectionState,
    gateway::{GatewayConnection, GatewayOpcode},
    mux::EventMux,
    session::Session,
    transport::RateLimitedTransport,
    worker::DrainPolicy,
};

/// Discord client.
///
/// The cache is attached before any user handler, so handlers always see the
/// cache with their own event applied.
#[derive(Debug, Clone)]
pub struct DiscordClient {
    config: DiscordConfig,
    api: DiscordApiClient,
    mux: EventMux,
    cache: StateCache,
}

impl DiscordClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::Config`] for invalid configuration and
    /// [`DiscordError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: DiscordConfig) -> DiscordResult<Self> {
        config.validate()?;

        let transport = Arc::new(RateLimitedTransport::new(&config)?);
        let api = DiscordApiClient::new(transport);
        let mux = EventMux::new(config.dispatch);
        let cache = StateCache::new();
        cache.attach(&mux);

        Ok(Self {
            config,
            api,
            mux,
            cache,
        })
    }

    #[must_use]
    pub const fn api(&self) -> &DiscordApiClient {
        &self.api
    }

    #[must_use]
    pub const fn mux(&self) -> &EventMux {
        &self.mux
    }

    #[must_use]
    pub const fn cache(&self) -> &StateCache {
        &self.cache
    }

    /// Register a synchronous handler for `type_tag`.
    pub fn on<E, F>(&self, type_tag: impl Into<String>, handler: F)
    where
        E: DeserializeOwned + Send + 'static,
        F: Fn(E) -> DiscordResult<()> + Send + Sync + 'static,
    {
        self.mux.on(type_tag, handler);
    }

    /// Open the gateway in a background task.
    #[must_use]
    pub fn connect(&self) -> GatewayHandle {
        let connection = Arc::new(GatewayConnection::new(
            self.config.clone(),
            self.api.clone(),
            self.mux.clone(),
        ));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn({
            let connection = Arc::clone(&connection);
            async move { connection.run(shutdown_rx).await }
        });
        info!("Gateway task started");

        GatewayHandle {
            connection,
            shutdown,
            task,
            mux: self.mux.clone(),
        }
    }
}

/// Control handle for a running gateway connection.
pub struct GatewayHandle {
    connection: Arc<GatewayConnection>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<DiscordResult<()>>,
    mux: EventMux,
}

impl GatewayHandle {
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Wait until the connection reaches `state`, or give up after `within`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::Gateway`] on timeout or if the connection task ended.
    pub async fn wait_for_state(
        &self,
        state: ConnectionState,
        within: Duration,
    ) -> DiscordResult<()> {
        let mut rx = self.connection.subscribe();
        let outcome =
            match tokio::time::timeout(within, rx.wait_for(|current| *current == state)).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(_)) => Err(DiscordError::Gateway("gateway task ended".into())),
                Err(_) => Err(DiscordError::Gateway(format!(
                    "state {state:?} not reached within {within:?}"
                ))),
            };
        outcome
    }

    /// See [`GatewayConnection::send_frame`].
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::Gateway`] when the opcode is not allowed or the
    /// connection is not up.
    pub async fn send_frame(&self, op: GatewayOpcode, d: Value) -> DiscordResult<()> {
        self.connection.send_frame(op, d).await
    }

    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.connection.latency()
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.connection.session()
    }

    /// Whether the connection task has stopped on its own.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Close the gateway, then stop the worker pool.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the connection, if it stopped on a fatal close.
    pub async fn shutdown(self, policy: DrainPolicy) -> DiscordResult<()> {
        let _ = self.shutdown.send(true);
        let outcome = match self.task.await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "Gateway task panicked");
                Err(DiscordError::Gateway(format!("gateway task failed: {err}")))
            }
        };
        self.mux.shutdown(policy).await;
        info!(?policy, "Gateway shut down");
        outcome
    }
}
