//! Heartbeat bookkeeping and timer task.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::gateway::GatewayOpcode;
use crate::session::Session;
use crate::types::GatewayPayload;

#[derive(Debug, Default)]
struct MonitorState {
    awaiting_ack: bool,
    sent_at: Option<Instant>,
    latency: Option<Duration>,
}

/// Tracks whether the last heartbeat was acknowledged.
#[derive(Debug, Default)]
pub struct HeartbeatMonitor {
    state: Mutex<MonitorState>,
}

impl HeartbeatMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget any outstanding heartbeat. Latency survives reconnects.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.awaiting_ack = false;
        state.sent_at = None;
    }

    /// Start a timer tick. Returns `false` when the previous heartbeat was never
    /// acknowledged, meaning the connection is dead.
    pub fn begin_tick(&self) -> bool {
        let mut state = self.state.lock();
        if state.awaiting_ack {
            return false;
        }
        state.awaiting_ack = true;
        state.sent_at = Some(Instant::now());
        true
    }

    /// Note a heartbeat sent outside the timer, e.g. on server request.
    pub fn record_sent(&self) {
        let mut state = self.state.lock();
        state.awaiting_ack = true;
        state.sent_at = Some(Instant::now());
    }

    /// Handle an ACK. Returns the round trip if a heartbeat was outstanding.
    pub fn record_ack(&self) -> Option<Duration> {
        let mut state = self.state.lock();
        state.awaiting_ack = false;
        let latency = state.sent_at.take()?.elapsed();
        state.latency = Some(latency);
        Some(latency)
    }

    /// Last measured round trip.
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.state.lock().latency
    }
}

/// Heartbeat frame for the given sequence.
#[must_use]
pub fn heartbeat_frame(sequence: Option<u64>) -> Message {
    let payload = GatewayPayload {
        op: GatewayOpcode::Heartbeat as u8,
        d: Some(sequence.map_or(serde_json::Value::Null, serde_json::Value::from)),
        s: None,
        t: None,
    };
    let text = serde_json::to_string(&payload).unwrap_or_else(|_| r#"{"op":1,"d":null}"#.into());
    Message::Text(text.into())
}

/// Per-connection timer task inputs.
pub struct HeartbeatTask {
    pub interval: Duration,
    pub jitter: f64,
    pub monitor: Arc<HeartbeatMonitor>,
    pub session: Arc<Mutex<Session>>,
    pub outbound: mpsc::Sender<Message>,
    /// Fired once when a tick finds the previous heartbeat unacknowledged.
    pub zombie: oneshot::Sender<()>,
}

impl HeartbeatTask {
    /// Beat until the connection is found dead or the writer goes away.
    pub async fn run(self) {
        let first = dgw_ratelimit::jittered_below(self.interval, self.jitter);
        trace!(
            first_ms = first.as_millis(),
            interval_ms = self.interval.as_millis(),
            "Heartbeat scheduled"
        );
        sleep(first).await;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // The first tick completes immediately.
            ticker.tick().await;

            if !self.monitor.begin_tick() {
                warn!(
                    interval_ms = self.interval.as_millis(),
                    "Heartbeat not acknowledged, connection is zombied"
                );
                let _ = self.zombie.send(());
                return;
            }

            let sequence = self.session.lock().sequence;
            if self.outbound.send(heartbeat_frame(sequence)).await.is_err() {
                debug!("Writer closed, stopping heartbeat");
                return;
            }
            trace!(?sequence, "Sent heartbeat");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unacked_tick_is_detected() {
        let monitor = HeartbeatMonitor::new();
        assert!(monitor.begin_tick());
        assert!(!monitor.begin_tick());

        assert!(monitor.record_ack().is_some());
        assert!(monitor.begin_tick());
    }

    #[test]
    fn test_stray_ack_has_no_latency() {
        let monitor = HeartbeatMonitor::new();
        assert!(monitor.record_ack().is_none());
        assert!(monitor.latency().is_none());
    }

    #[test]
    fn test_frame_carries_sequence() {
        let Message::Text(text) = heartbeat_frame(Some(42)) else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value["op"], 1);
        assert_eq!(value["d"], 42);

        let Message::Text(text) = heartbeat_frame(None) else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert!(value["d"].is_null());
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_beats_then_detects_zombie() {
        let monitor = Arc::new(HeartbeatMonitor::new());
        let session = Arc::new(Mutex::new(Session::default()));
        session.lock().observe(Some(7));
        let (tx, mut rx) = mpsc::channel(8);
        let (zombie_tx, zombie_rx) = oneshot::channel();

        let task = tokio::spawn(
            HeartbeatTask {
                interval: Duration::from_millis(5000),
                jitter: 0.0,
                monitor: Arc::clone(&monitor),
                session,
                outbound: tx,
                zombie: zombie_tx,
            }
            .run(),
        );

        // First beat after one full interval with no jitter.
        let Message::Text(text) = rx.recv().await.unwrap() else {
            panic!("expected text frame");
        };
        assert!(text.as_str().contains("\"d\":7"));

        // Acked once, then silence.
        monitor.record_ack();
        assert!(rx.recv().await.is_some());

        zombie_rx.await.unwrap();
        task.await.unwrap();
    }
}
