//! Event routing.
//!
//! [`EventMux`] maps a dispatch type tag to the handlers registered for it.
//! Each handler names its payload type when it is registered; the payload is
//! decoded once per handler when an envelope arrives.
//!
//! Synchronous handlers run on the caller of [`EventMux::route`], in
//! registration order. Worker handlers for one event are bundled into a single
//! job that is queued after every synchronous handler has returned, so a
//! worker always observes the cache with the event already applied.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, trace, warn};

use crate::config::DispatchConfig;
use crate::error::{DiscordError, DiscordResult};
use crate::events::{
    ClientErrorReport, EventEnvelope, GatewayStateEvent, CLIENT_ERROR, GATEWAY_STATE,
};
use crate::worker::{DrainPolicy, SubmitError, WorkerPool};

/// Where a handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Inline, before `route` returns.
    Sync,
    /// On the bounded worker pool.
    Worker,
}

type HandlerFuture = BoxFuture<'static, DiscordResult<()>>;
type SyncHandler = Arc<dyn Fn(&EventEnvelope) -> DiscordResult<()> + Send + Sync>;
type WorkerHandler = Arc<dyn Fn(&EventEnvelope) -> DiscordResult<HandlerFuture> + Send + Sync>;

#[derive(Clone)]
enum Registration {
    Sync(SyncHandler),
    Worker(WorkerHandler),
}

struct MuxInner {
    handlers: RwLock<HashMap<String, Arc<Vec<Registration>>>>,
    pool: WorkerPool,
}

/// Routing table from type tag to handlers. Cheap to clone.
#[derive(Clone)]
pub struct EventMux {
    inner: Arc<MuxInner>,
}

impl std::fmt::Debug for EventMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.inner.handlers.read();
        f.debug_struct("EventMux")
            .field("tags", &handlers.len())
            .field("queue_depth", &self.inner.pool.queue_depth())
            .finish()
    }
}

impl Default for EventMux {
    fn default() -> Self {
        Self::new(DispatchConfig::default())
    }
}

fn decode<E: DeserializeOwned>(envelope: &EventEnvelope) -> DiscordResult<E> {
    E::deserialize(&envelope.payload).map_err(|source| DiscordError::MalformedEvent {
        type_tag: envelope.type_tag.clone().unwrap_or_default(),
        source,
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".into())
}

impl EventMux {
    /// Empty table with a worker pool sized by `dispatch`.
    #[must_use]
    pub fn new(dispatch: DispatchConfig) -> Self {
        Self {
            inner: Arc::new(MuxInner {
                handlers: RwLock::new(HashMap::new()),
                pool: WorkerPool::new(dispatch),
            }),
        }
    }

    /// Register a handler that decodes its payload as `E`.
    ///
    /// In [`ExecutionMode::Worker`] the call itself runs on a pool worker.
    pub fn register<E, F>(&self, type_tag: impl Into<String>, mode: ExecutionMode, handler: F)
    where
        E: DeserializeOwned + Send + 'static,
        F: Fn(E) -> DiscordResult<()> + Send + Sync + 'static,
    {
        match mode {
            ExecutionMode::Sync => {
                let erased: SyncHandler =
                    Arc::new(move |envelope: &EventEnvelope| handler(decode(envelope)?));
                self.push(type_tag.into(), Registration::Sync(erased));
            }
            ExecutionMode::Worker => {
                let handler = Arc::new(handler);
                let erased: WorkerHandler = Arc::new(move |envelope: &EventEnvelope| {
                    let event: E = decode(envelope)?;
                    let handler = Arc::clone(&handler);
                    Ok(async move { handler(event) }.boxed())
                });
                self.push(type_tag.into(), Registration::Worker(erased));
            }
        }
    }

    /// Register a synchronous handler.
    pub fn on<E, F>(&self, type_tag: impl Into<String>, handler: F)
    where
        E: DeserializeOwned + Send + 'static,
        F: Fn(E) -> DiscordResult<()> + Send + Sync + 'static,
    {
        self.register(type_tag, ExecutionMode::Sync, handler);
    }

    /// Register an async handler that runs on the worker pool.
    pub fn on_worker<E, F, Fut>(&self, type_tag: impl Into<String>, handler: F)
    where
        E: DeserializeOwned + Send + 'static,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DiscordResult<()>> + Send + 'static,
    {
        let erased: WorkerHandler =
            Arc::new(move |envelope: &EventEnvelope| Ok(handler(decode(envelope)?).boxed()));
        self.push(type_tag.into(), Registration::Worker(erased));
    }

    /// Number of handlers registered for a tag.
    #[must_use]
    pub fn handler_count(&self, type_tag: &str) -> usize {
        self.inner
            .handlers
            .read()
            .get(type_tag)
            .map_or(0, |list| list.len())
    }

    fn push(&self, type_tag: String, registration: Registration) {
        let mut handlers = self.inner.handlers.write();
        let list = handlers.entry(type_tag).or_default();
        let mut next = Vec::with_capacity(list.len() + 1);
        next.extend(list.iter().cloned());
        next.push(registration);
        *list = Arc::new(next);
    }

    /// Deliver one envelope to every handler registered for its tag.
    ///
    /// Unknown tags are dropped. Decode failures, handler errors and panics are
    /// reported as [`CLIENT_ERROR`] events and never propagate to the caller.
    pub fn route(&self, envelope: &EventEnvelope) {
        let Some(tag) = envelope.type_tag.as_deref() else {
            return;
        };
        let Some(handlers) = self.inner.handlers.read().get(tag).cloned() else {
            trace!(type_tag = tag, "No handlers registered");
            return;
        };

        dgw_telemetry::metrics::record_event_dispatched(tag);

        let mut jobs: Vec<HandlerFuture> = Vec::new();
        for registration in handlers.iter() {
            match registration {
                Registration::Sync(handler) => {
                    match catch_unwind(AssertUnwindSafe(|| handler(envelope))) {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => self.report(envelope, err),
                        Err(panic) => self.report_panic(envelope, panic.as_ref()),
                    }
                }
                Registration::Worker(handler) => {
                    match catch_unwind(AssertUnwindSafe(|| handler(envelope))) {
                        Ok(Ok(job)) => jobs.push(job),
                        Ok(Err(err)) => self.report(envelope, err),
                        Err(panic) => self.report_panic(envelope, panic.as_ref()),
                    }
                }
            }
        }

        if !jobs.is_empty() {
            self.submit(envelope, jobs);
        }
    }

    fn submit(&self, envelope: &EventEnvelope, jobs: Vec<HandlerFuture>) {
        let mux = self.clone();
        let context = envelope.clone();
        let job = async move {
            for job in jobs {
                match AssertUnwindSafe(job).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => mux.report(&context, err),
                    Err(panic) => mux.report_panic(&context, panic.as_ref()),
                }
            }
        }
        .boxed();

        if let Err(reason) = self.inner.pool.submit(job) {
            dgw_telemetry::metrics::record_worker_rejected();
            let message = match reason {
                SubmitError::Full => "worker queue full, event dropped for worker handlers",
                SubmitError::Closed => "worker pool shut down, event dropped for worker handlers",
            };
            warn!(type_tag = ?envelope.type_tag, sequence = ?envelope.sequence, "{message}");
            self.emit(
                envelope,
                ClientErrorReport {
                    kind: "worker_rejected".into(),
                    message: message.into(),
                    type_tag: envelope.type_tag.clone(),
                    sequence: envelope.sequence,
                    payload: Some(envelope.payload.clone()),
                    fault: None,
                },
            );
        }
    }

    fn report_panic(&self, envelope: &EventEnvelope, panic: &(dyn Any + Send)) {
        let message = format!("handler panicked: {}", panic_message(panic));
        self.report(envelope, DiscordError::handler(message));
    }

    fn report(&self, envelope: &EventEnvelope, err: DiscordError) {
        let err = match err {
            DiscordError::Handler { message, .. } => DiscordError::Handler {
                type_tag: envelope.type_tag.clone().unwrap_or_default(),
                sequence: envelope.sequence,
                message,
            },
            other => other,
        };
        dgw_telemetry::metrics::record_handler_error(err.kind());
        warn!(
            type_tag = ?envelope.type_tag,
            sequence = ?envelope.sequence,
            kind = err.kind(),
            error = %err,
            "Event handling failed"
        );

        let fault = match &err {
            DiscordError::ConsistencyFault(fault) => Some(fault.clone()),
            _ => None,
        };
        self.emit(
            envelope,
            ClientErrorReport {
                kind: err.kind().into(),
                message: err.to_string(),
                type_tag: envelope.type_tag.clone(),
                sequence: envelope.sequence,
                payload: Some(envelope.payload.clone()),
                fault,
            },
        );
    }

    /// Route an error that did not come from a handler, e.g. a fatal close.
    pub fn report_error(&self, err: &DiscordError) {
        dgw_telemetry::metrics::record_handler_error(err.kind());
        self.emit_report(ClientErrorReport {
            kind: err.kind().into(),
            message: err.to_string(),
            type_tag: None,
            sequence: None,
            payload: None,
            fault: None,
        });
    }

    fn emit(&self, source: &EventEnvelope, report: ClientErrorReport) {
        // A failing error handler must not feed itself.
        if source.type_tag.as_deref() == Some(CLIENT_ERROR) {
            error!(kind = %report.kind, message = %report.message, "Error handler failed");
            return;
        }
        self.emit_report(report);
    }

    fn emit_report(&self, report: ClientErrorReport) {
        match serde_json::to_value(&report) {
            Ok(payload) => self.route(&EventEnvelope::dispatch(CLIENT_ERROR, None, payload)),
            Err(err) => error!(error = %err, "Failed to encode error report"),
        }
    }

    /// Route a connection state transition as a [`GATEWAY_STATE`] event.
    pub fn publish_state(&self, event: &GatewayStateEvent) {
        match serde_json::to_value(event) {
            Ok(payload) => self.route(&EventEnvelope::dispatch(GATEWAY_STATE, None, payload)),
            Err(err) => error!(error = %err, "Failed to encode state event"),
        }
    }

    /// Jobs waiting for a worker.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.inner.pool.queue_depth()
    }

    /// Stop the worker pool.
    pub async fn shutdown(&self, policy: DrainPolicy) {
        debug!(?policy, "Shutting down event mux");
        self.inner.pool.shutdown(policy).await;
    }
}

/// Decode helper for callers that route raw values.
///
/// # Errors
///
/// Returns [`DiscordError::MalformedEvent`] when the payload does not match `E`.
pub fn decode_payload<'de, E: Deserialize<'de>>(
    type_tag: &str,
    payload: &'de serde_json::Value,
) -> DiscordResult<E> {
    E::deserialize(payload).map_err(|source| DiscordError::MalformedEvent {
        type_tag: type_tag.to_string(),
        source,
    })
}
