//! Discord Gateway (WebSocket) connection.
//!
//! [`GatewayConnection::run`] owns the whole session lifecycle: resolve the
//! endpoint, open the socket, wait for Hello, identify or resume, then read
//! frames until the connection ends. Ends other than an explicit shutdown or a
//! fatal close code lead back round the loop after a backoff delay.
//!
//! Per connection there is one reader (the `run` future itself), one writer task
//! that owns the socket sink, and one heartbeat task.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitStream, StreamExt};
use futures_util::SinkExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use crate::{
    api::DiscordApiClient,
    config::DiscordConfig,
    error::{DiscordError, DiscordResult},
    events::{ConnectionState, EventEnvelope, GatewayStateEvent, Ready, READY, RESUMED},
    heartbeat::{heartbeat_frame, HeartbeatMonitor, HeartbeatTask},
    mux::{decode_payload, EventMux},
    session::{SequenceCheck, Session},
    types::{
        GatewayHello, GatewayIdentify, GatewayPayload, GatewayProperties, GatewayResume,
    },
};

/// Gateway API version requested on connect.
pub const GATEWAY_VERSION: u8 = 10;

/// Close codes after which reconnecting cannot succeed.
pub const FATAL_CLOSE_CODES: [u16; 6] = [4004, 4010, 4011, 4012, 4013, 4014];

/// Close codes that invalidate the session but allow a fresh identify.
pub const SESSION_RESET_CLOSE_CODES: [u16; 2] = [4007, 4009];

/// Close code we send when we intend to resume.
const RESUMABLE_CLOSE: u16 = 4000;

const OUTBOUND_CAPACITY: usize = 64;
const WRITER_GRACE: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Discord Gateway opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GatewayOpcode {
    /// Receive: An event was dispatched.
    Dispatch = 0,
    /// Send/Receive: Fired periodically to keep the connection alive.
    Heartbeat = 1,
    /// Send: Starts a new session.
    Identify = 2,
    /// Send: Update presence.
    PresenceUpdate = 3,
    /// Send: Join/leave or move between voice channels.
    VoiceStateUpdate = 4,
    /// Send: Voice server ping.
    VoiceServerPing = 5,
    /// Send: Resume a previous session.
    Resume = 6,
    /// Receive: Reconnect to the gateway.
    Reconnect = 7,
    /// Send: Request guild members.
    RequestGuildMembers = 8,
    /// Receive: Session invalidated.
    InvalidSession = 9,
    /// Receive: Sent after connecting.
    Hello = 10,
    /// Receive: Heartbeat acknowledged.
    HeartbeatAck = 11,
}

impl GatewayOpcode {
    /// Opcodes the application may send through [`GatewayConnection::send_frame`].
    #[must_use]
    pub const fn is_passthrough(self) -> bool {
        matches!(
            self,
            Self::PresenceUpdate
                | Self::VoiceStateUpdate
                | Self::VoiceServerPing
                | Self::RequestGuildMembers
        )
    }
}

impl TryFrom<u8> for GatewayOpcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Dispatch),
            1 => Ok(Self::Heartbeat),
            2 => Ok(Self::Identify),
            3 => Ok(Self::PresenceUpdate),
            4 => Ok(Self::VoiceStateUpdate),
            5 => Ok(Self::VoiceServerPing),
            6 => Ok(Self::Resume),
            7 => Ok(Self::Reconnect),
            8 => Ok(Self::RequestGuildMembers),
            9 => Ok(Self::InvalidSession),
            10 => Ok(Self::Hello),
            11 => Ok(Self::HeartbeatAck),
            other => Err(other),
        }
    }
}

/// What a close code asks of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Stop for good.
    Fatal,
    /// Drop the session, then reconnect and identify.
    ResetSession,
    /// Reconnect and resume.
    Resume,
}

/// Classify a server close code.
#[must_use]
pub fn classify_close(code: u16) -> CloseAction {
    if FATAL_CLOSE_CODES.contains(&code) {
        CloseAction::Fatal
    } else if SESSION_RESET_CLOSE_CODES.contains(&code) {
        CloseAction::ResetSession
    } else {
        CloseAction::Resume
    }
}

/// Gateway URL with the version and encoding query applied.
///
/// # Errors
///
/// Returns [`DiscordError::Gateway`] if `base` is not a valid URL.
pub fn gateway_url(base: &str) -> DiscordResult<Url> {
    let mut url =
        Url::parse(base).map_err(|e| DiscordError::Gateway(format!("Invalid gateway URL {base}: {e}")))?;
    url.query_pairs_mut()
        .clear()
        .append_pair("v", &GATEWAY_VERSION.to_string())
        .append_pair("encoding", "json");
    Ok(url)
}

/// Why one connection ended.
#[derive(Debug)]
enum Exit {
    Shutdown,
    Reconnect { clear_session: bool, reason: String },
    Fatal(DiscordError),
}

impl Exit {
    fn reconnect(reason: impl Into<String>) -> Self {
        Self::Reconnect {
            clear_session: false,
            reason: reason.into(),
        }
    }

    fn fresh(reason: impl Into<String>) -> Self {
        Self::Reconnect {
            clear_session: true,
            reason: reason.into(),
        }
    }
}

enum Inbound {
    Payload(GatewayPayload),
    Malformed(serde_json::Error),
    Closed(Option<(u16, String)>),
}

async fn next_inbound(stream: &mut SplitStream<WsStream>) -> DiscordResult<Inbound> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                return Ok(match serde_json::from_str(text.as_str()) {
                    Ok(payload) => Inbound::Payload(payload),
                    Err(err) => Inbound::Malformed(err),
                });
            }
            Some(Ok(Message::Close(frame))) => {
                return Ok(Inbound::Closed(
                    frame.map(|f| (u16::from(f.code), f.reason.to_string())),
                ));
            }
            Some(Ok(Message::Binary(_))) => {
                return Err(DiscordError::ProtocolViolation(
                    "binary frame on a JSON connection".into(),
                ));
            }
            Some(Ok(_)) => {
                // Ping/pong are answered by tungstenite
            }
            Some(Err(err)) => return Err(err.into()),
            None => return Ok(Inbound::Closed(None)),
        }
    }
}

fn close_exit(frame: Option<(u16, String)>) -> Exit {
    let Some((code, reason)) = frame else {
        return Exit::reconnect("connection ended");
    };
    match classify_close(code) {
        CloseAction::Fatal => Exit::Fatal(DiscordError::FatalClose { code, reason }),
        CloseAction::ResetSession => Exit::fresh(format!("closed with {code}: {reason}")),
        CloseAction::Resume => Exit::reconnect(format!("closed with {code}: {reason}")),
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Discord Gateway connection.
pub struct GatewayConnection {
    config: DiscordConfig,
    api: DiscordApiClient,
    mux: EventMux,
    session: Arc<Mutex<Session>>,
    /// Bootstrap endpoint, resolved once.
    endpoint: Mutex<Option<String>>,
    state: watch::Sender<ConnectionState>,
    monitor: Arc<HeartbeatMonitor>,
    /// Writer queue of the live connection.
    outbound: Mutex<Option<mpsc::Sender<Message>>>,
    attempts: AtomicU32,
    redact_fields: Vec<String>,
}

impl GatewayConnection {
    /// Create a new gateway connection.
    #[must_use]
    pub fn new(config: DiscordConfig, api: DiscordApiClient, mux: EventMux) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            api,
            mux,
            session: Arc::new(Mutex::new(Session::default())),
            endpoint: Mutex::new(None),
            state,
            monitor: Arc::new(HeartbeatMonitor::new()),
            outbound: Mutex::new(None),
            attempts: AtomicU32::new(0),
            redact_fields: dgw_telemetry::DEFAULT_REDACT_FIELDS
                .iter()
                .map(|f| (*f).to_string())
                .collect(),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Snapshot of the session.
    #[must_use]
    pub fn session(&self) -> Session {
        self.session.lock().clone()
    }

    /// Last heartbeat round trip.
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.monitor.latency()
    }

    /// Send an application frame (presence, voice state, member request).
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::Gateway`] for opcodes the connection manages itself
    /// or when no session is connected.
    pub async fn send_frame(&self, op: GatewayOpcode, d: Value) -> DiscordResult<()> {
        if !op.is_passthrough() {
            return Err(DiscordError::Gateway(format!(
                "opcode {op:?} is managed by the connection"
            )));
        }
        if self.state() != ConnectionState::Connected {
            return Err(DiscordError::Gateway("not connected".into()));
        }
        let tx = self
            .outbound
            .lock()
            .clone()
            .ok_or_else(|| DiscordError::Gateway("not connected".into()))?;

        let frame = GatewayPayload {
            op: op as u8,
            d: Some(d),
            s: None,
            t: None,
        };
        tx.send(Message::Text(serde_json::to_string(&frame)?.into()))
            .await
            .map_err(|_| DiscordError::Gateway("connection closed".into()))
    }

    /// Keep a session alive until `shutdown` flips to `true`.
    ///
    /// Returns `Ok` after a requested shutdown and `Err` after a fatal close code.
    /// Either way the state ends as [`ConnectionState::Disconnected`].
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::FatalClose`] when the server forbids reconnecting.
    #[instrument(skip_all)]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> DiscordResult<()> {
        let backoff = self.config.reconnect.backoff();

        let outcome = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            match self.connect_once(&mut shutdown).await {
                Exit::Shutdown => break Ok(()),
                Exit::Fatal(err) => {
                    warn!(error = %err, "Gateway closed for good");
                    self.mux.report_error(&err);
                    break Err(err);
                }
                Exit::Reconnect {
                    clear_session,
                    reason,
                } => {
                    if clear_session {
                        self.session.lock().clear();
                    }
                    let attempt = self.attempts.fetch_add(1, Ordering::AcqRel);
                    let delay = backoff.delay_for_attempt(attempt);
                    let resumable = self.session.lock().can_resume();
                    self.transition(ConnectionState::Reconnecting);
                    dgw_telemetry::metrics::record_gateway_reconnect(resumable);
                    info!(
                        reason = %reason,
                        attempt,
                        delay_ms = delay.as_millis(),
                        resumable,
                        "Reconnecting to gateway"
                    );

                    tokio::select! {
                        () = sleep(delay) => {}
                        _ = shutdown.wait_for(|stop| *stop) => break Ok(()),
                    }
                }
            }
        };

        self.transition(ConnectionState::Disconnected);
        outcome
    }

    async fn connect_once(&self, shutdown: &mut watch::Receiver<bool>) -> Exit {
        self.transition(ConnectionState::Connecting);

        let resuming = self.session.lock().can_resume();
        let url = match self.endpoint_for(resuming).await.and_then(|base| gateway_url(&base)) {
            Ok(url) => url,
            Err(err) => return self.failed(err),
        };
        info!(
            url = %url,
            resuming,
            token = %dgw_telemetry::mask_secret(self.config.token()),
            "Connecting to Discord gateway"
        );

        let stream = tokio::select! {
            result = connect_async(url.as_str()) => match result {
                Ok((stream, _)) => stream,
                Err(err) => return self.failed(err.into()),
            },
            _ = shutdown.wait_for(|stop| *stop) => return Exit::Shutdown,
        };

        let (mut sink, mut stream) = stream.split();
        let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);
        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(err) = sink.send(message).await {
                    debug!(error = %err, "Gateway writer stopped");
                    return;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });
        *self.outbound.lock() = Some(tx.clone());

        let exit = self.drive(&mut stream, &tx, shutdown).await;

        *self.outbound.lock() = None;
        let code = match &exit {
            Exit::Reconnect {
                clear_session: false,
                ..
            } => RESUMABLE_CLOSE,
            _ => u16::from(CloseCode::Normal),
        };
        let _ = tx
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            })))
            .await;
        drop(tx);
        if timeout(WRITER_GRACE, writer).await.is_err() {
            debug!("Gateway writer did not finish in time");
        }

        exit
    }

    /// Handshake and read loop for one open socket.
    async fn drive(
        &self,
        stream: &mut SplitStream<WsStream>,
        tx: &mpsc::Sender<Message>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Exit {
        self.transition(ConnectionState::AwaitingHello);

        let first = tokio::select! {
            result = timeout(self.config.hello_timeout, next_inbound(stream)) => result,
            _ = shutdown.wait_for(|stop| *stop) => return Exit::Shutdown,
        };
        let hello = match first {
            Err(_) => {
                return self.failed(DiscordError::ProtocolViolation(format!(
                    "no Hello within {:?}",
                    self.config.hello_timeout
                )))
            }
            Ok(Err(err)) => return self.failed(err),
            Ok(Ok(Inbound::Closed(frame))) => return close_exit(frame),
            Ok(Ok(Inbound::Malformed(err))) => {
                return self.failed(DiscordError::ProtocolViolation(format!(
                    "undecodable first frame: {err}"
                )))
            }
            Ok(Ok(Inbound::Payload(payload))) => match parse_hello(payload) {
                Ok(hello) => hello,
                Err(err) => return self.failed(err),
            },
        };

        let interval = Duration::from_millis(hello.heartbeat_interval);
        debug!(interval_ms = hello.heartbeat_interval, "Received Hello");
        self.session.lock().heartbeat_interval = Some(interval);
        self.monitor.reset();

        let (zombie_tx, mut zombie_rx) = oneshot::channel();
        let _heartbeat = AbortOnDrop(tokio::spawn(
            HeartbeatTask {
                interval,
                jitter: self.config.heartbeat_jitter,
                monitor: Arc::clone(&self.monitor),
                session: Arc::clone(&self.session),
                outbound: tx.clone(),
                zombie: zombie_tx,
            }
            .run(),
        ));

        if let Err(err) = self.handshake(tx).await {
            return self.failed(err);
        }

        loop {
            let inbound = tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => return Exit::Shutdown,
                zombie = &mut zombie_rx => {
                    return match zombie {
                        Ok(()) => Exit::reconnect("heartbeat not acknowledged"),
                        Err(_) => Exit::reconnect("gateway writer closed"),
                    };
                }
                inbound = next_inbound(stream) => inbound,
            };

            let payload = match inbound {
                Ok(Inbound::Payload(payload)) => payload,
                Ok(Inbound::Malformed(err)) => {
                    warn!(error = %err, "Failed to parse gateway payload");
                    continue;
                }
                Ok(Inbound::Closed(frame)) => {
                    info!(frame = ?frame, "Gateway connection closed");
                    return close_exit(frame);
                }
                Err(err) => return self.failed(err),
            };

            match GatewayOpcode::try_from(payload.op) {
                Ok(GatewayOpcode::Dispatch) => self.on_dispatch(payload),
                Ok(GatewayOpcode::Heartbeat) => {
                    let sequence = self.session.lock().sequence;
                    self.monitor.record_sent();
                    if tx.send(heartbeat_frame(sequence)).await.is_err() {
                        return Exit::reconnect("gateway writer closed");
                    }
                    debug!("Answered heartbeat request");
                }
                Ok(GatewayOpcode::HeartbeatAck) => {
                    if let Some(latency) = self.monitor.record_ack() {
                        dgw_telemetry::metrics::record_heartbeat_latency(latency);
                        trace!(latency_ms = latency.as_millis(), "Heartbeat acknowledged");
                    }
                }
                Ok(GatewayOpcode::Reconnect) => {
                    info!("Received reconnect request");
                    return Exit::reconnect("server requested reconnect");
                }
                Ok(GatewayOpcode::InvalidSession) => {
                    let resumable = payload.d.as_ref().and_then(Value::as_bool).unwrap_or(false);
                    warn!(resumable, "Session invalidated, will identify");
                    return Exit::fresh("session invalidated");
                }
                Ok(op) => debug!(?op, "Ignoring opcode"),
                Err(op) => debug!(op, "Unknown opcode"),
            }
        }
    }

    async fn handshake(&self, tx: &mpsc::Sender<Message>) -> DiscordResult<()> {
        let resume = {
            let session = self.session.lock();
            session
                .session_id
                .clone()
                .zip(session.sequence)
        };

        let (op, data, kind) = if let Some((session_id, seq)) = resume {
            self.transition(ConnectionState::Resuming);
            info!(session_id = %session_id, sequence = seq, "Attempting to resume session");
            let resume = GatewayResume {
                token: self.config.token().to_string(),
                session_id,
                seq,
            };
            (GatewayOpcode::Resume, serde_json::to_value(&resume)?, "resume")
        } else {
            // A fresh session numbers from scratch.
            self.session.lock().clear();
            self.transition(ConnectionState::Identifying);
            let identify = GatewayIdentify {
                token: self.config.token().to_string(),
                intents: self.config.intents,
                properties: GatewayProperties {
                    os: std::env::consts::OS.into(),
                    browser: "dgw-discord".into(),
                    device: "dgw-discord".into(),
                },
                shard: self.config.shard.as_ref().map(|s| [s.shard_id, s.shard_count]),
            };
            (GatewayOpcode::Identify, serde_json::to_value(&identify)?, "identify")
        };

        debug!(
            payload = %dgw_telemetry::redact_sensitive(&data, &self.redact_fields),
            "Sending {kind}"
        );
        dgw_telemetry::metrics::record_gateway_connect(kind);

        let frame = GatewayPayload {
            op: op as u8,
            d: Some(data),
            s: None,
            t: None,
        };
        tx.send(Message::Text(serde_json::to_string(&frame)?.into()))
            .await
            .map_err(|_| DiscordError::Gateway(format!("Failed to send {kind}")))
    }

    fn on_dispatch(&self, payload: GatewayPayload) {
        let Some(type_tag) = payload.t else {
            warn!(sequence = ?payload.s, "Dispatch without event name");
            return;
        };
        let data = payload.d.unwrap_or(Value::Null);

        if self.session.lock().observe(payload.s) == SequenceCheck::Duplicate {
            debug!(type_tag = %type_tag, sequence = ?payload.s, "Dropping replayed dispatch");
            return;
        }

        let connected = match type_tag.as_str() {
            READY => {
                if let Ok(ready) = decode_payload::<Ready>(READY, &data) {
                    info!(
                        user = %ready.user.username,
                        session_id = %ready.session_id,
                        guilds = ready.guilds.len(),
                        "Gateway ready"
                    );
                    self.session
                        .lock()
                        .start(ready.session_id, ready.resume_gateway_url);
                }
                true
            }
            RESUMED => {
                info!("Session resumed successfully");
                true
            }
            _ => false,
        };

        self.mux.route(&EventEnvelope {
            opcode: GatewayOpcode::Dispatch as u8,
            sequence: payload.s,
            type_tag: Some(type_tag),
            payload: data,
        });

        if connected {
            self.transition(ConnectionState::Connected);
        }
    }

    async fn endpoint_for(&self, resuming: bool) -> DiscordResult<String> {
        let resume_url = if resuming {
            self.session.lock().resume_url.clone()
        } else {
            None
        };
        match resume_url {
            Some(url) => Ok(url),
            None => self.endpoint().await,
        }
    }

    async fn endpoint(&self) -> DiscordResult<String> {
        let cached = self.endpoint.lock().clone();
        if let Some(url) = cached {
            return Ok(url);
        }
        let url = match &self.config.gateway_url {
            Some(url) => url.clone(),
            None => self.api.get_gateway_bot().await?.url,
        };
        debug!(url = %url, "Resolved gateway endpoint");
        *self.endpoint.lock() = Some(url.clone());
        Ok(url)
    }

    fn failed(&self, err: DiscordError) -> Exit {
        warn!(error = %err, "Gateway connection failed");
        self.mux.report_error(&err);
        Exit::reconnect(err.to_string())
    }

    fn transition(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous == state {
            return;
        }
        if state == ConnectionState::Connected {
            self.attempts.store(0, Ordering::Release);
        }

        let (session_id, sequence) = {
            let session = self.session.lock();
            (session.session_id.clone(), session.sequence)
        };
        debug!(from = ?previous, to = ?state, "Gateway state changed");
        self.mux.publish_state(&GatewayStateEvent {
            state,
            session_id,
            sequence,
        });
    }
}

fn parse_hello(payload: GatewayPayload) -> DiscordResult<GatewayHello> {
    if payload.op != GatewayOpcode::Hello as u8 {
        return Err(DiscordError::ProtocolViolation(format!(
            "expected Hello, got opcode {}",
            payload.op
        )));
    }
    let hello: GatewayHello = serde_json::from_value(payload.d.unwrap_or_default())
        .map_err(|e| DiscordError::ProtocolViolation(format!("invalid Hello: {e}")))?;
    if hello.heartbeat_interval == 0 {
        return Err(DiscordError::ProtocolViolation(
            "Hello with zero heartbeat interval".into(),
        ));
    }
    Ok(hello)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_opcode_roundtrip() {
        for op in 0..=11u8 {
            let parsed = GatewayOpcode::try_from(op).unwrap();
            assert_eq!(parsed as u8, op);
        }
        assert_eq!(GatewayOpcode::try_from(12), Err(12));
    }

    #[test]
    fn test_passthrough_opcodes() {
        assert!(GatewayOpcode::PresenceUpdate.is_passthrough());
        assert!(GatewayOpcode::RequestGuildMembers.is_passthrough());
        assert!(!GatewayOpcode::Identify.is_passthrough());
        assert!(!GatewayOpcode::Heartbeat.is_passthrough());
    }

    #[test]
    fn test_close_classification() {
        assert_eq!(classify_close(4004), CloseAction::Fatal);
        assert_eq!(classify_close(4014), CloseAction::Fatal);
        assert_eq!(classify_close(4007), CloseAction::ResetSession);
        assert_eq!(classify_close(4009), CloseAction::ResetSession);
        assert_eq!(classify_close(4000), CloseAction::Resume);
        assert_eq!(classify_close(1006), CloseAction::Resume);
    }

    #[test]
    fn test_gateway_url_query() {
        let url = gateway_url("wss://gateway.discord.gg").unwrap();
        assert_eq!(url.as_str(), "wss://gateway.discord.gg/?v=10&encoding=json");

        let replaced = gateway_url("ws://127.0.0.1:9000/?v=6&encoding=etf").unwrap();
        assert_eq!(replaced.query(), Some("v=10&encoding=json"));

        assert!(gateway_url("not a url").is_err());
    }

    #[test]
    fn test_parse_hello() {
        let ok = GatewayPayload {
            op: 10,
            d: Some(json!({"heartbeat_interval": 41250})),
            s: None,
            t: None,
        };
        assert_eq!(parse_hello(ok).unwrap().heartbeat_interval, 41250);

        let wrong = GatewayPayload {
            op: 0,
            d: Some(json!({})),
            s: Some(1),
            t: Some("READY".into()),
        };
        assert!(matches!(
            parse_hello(wrong),
            Err(DiscordError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_close_exit_mapping() {
        assert!(matches!(
            close_exit(Some((4004, "Authentication failed".into()))),
            Exit::Fatal(DiscordError::FatalClose { code: 4004, .. })
        ));
        assert!(matches!(
            close_exit(Some((4009, "Session timed out".into()))),
            Exit::Reconnect {
                clear_session: true,
                ..
            }
        ));
        assert!(matches!(
            close_exit(None),
            Exit::Reconnect {
                clear_session: false,
                ..
            }
        ));
    }
}
