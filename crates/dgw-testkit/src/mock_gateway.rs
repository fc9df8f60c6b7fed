//! Scripted WebSocket gateway.
//!
//! Every accepted connection becomes a [`MockSession`] handed to the test, which then
//! decides frame by frame what the server says. Nothing is sent automatically, so
//! tests can withhold heartbeat ACKs, close with specific codes or drop the socket.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// How long helpers wait for the client before failing the test.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(5);

enum ServerFrame {
    Text(String),
    Close(u16, String),
    Drop,
}

/// A WebSocket server for gateway tests.
pub struct MockGateway {
    addr: SocketAddr,
    sessions: Mutex<mpsc::UnboundedReceiver<MockSession>>,
    accept_task: JoinHandle<()>,
}

impl MockGateway {
    /// Bind to an ephemeral local port and start accepting.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock gateway");
        let addr = listener.local_addr().expect("mock gateway address");
        let (tx, rx) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(session) = accept_session(stream).await {
                        let _ = tx.send(session);
                    }
                });
            }
        });

        Self {
            addr,
            sessions: Mutex::new(rx),
            accept_task,
        }
    }

    /// `ws://` URL of the server.
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Wait for the next client connection.
    ///
    /// # Panics
    ///
    /// Panics if no client connects within [`SESSION_TIMEOUT`].
    pub async fn next_session(&self) -> MockSession {
        let mut sessions = self.sessions.lock().await;
        timeout(SESSION_TIMEOUT, sessions.recv())
            .await
            .expect("timed out waiting for a gateway connection")
            .expect("mock gateway stopped accepting")
    }

    /// Whether another connection arrives within `within`.
    pub async fn try_next_session(&self, within: Duration) -> Option<MockSession> {
        let mut sessions = self.sessions.lock().await;
        timeout(within, sessions.recv()).await.ok().flatten()
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// One client connection.
pub struct MockSession {
    /// Request target the client connected with, e.g. `/?v=10&encoding=json`.
    pub request_uri: String,
    outbound: mpsc::UnboundedSender<ServerFrame>,
    inbound: mpsc::UnboundedReceiver<serde_json::Value>,
}

impl MockSession {
    /// Send a JSON payload.
    pub fn send_json(&self, value: serde_json::Value) {
        let _ = self.outbound.send(ServerFrame::Text(value.to_string()));
    }

    /// Send a raw text frame.
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.outbound.send(ServerFrame::Text(text.into()));
    }

    /// Close the connection with a close frame.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.outbound.send(ServerFrame::Close(code, reason.to_string()));
    }

    /// Drop the TCP connection without a close frame.
    pub fn drop_connection(&self) {
        let _ = self.outbound.send(ServerFrame::Drop);
    }

    /// Next payload from the client, or `None` once the client disconnected.
    ///
    /// # Panics
    ///
    /// Panics if nothing arrives within [`SESSION_TIMEOUT`].
    pub async fn recv_json(&mut self) -> Option<serde_json::Value> {
        timeout(SESSION_TIMEOUT, self.inbound.recv())
            .await
            .expect("timed out waiting for a client frame")
    }

    /// Next payload with opcode `op`, skipping heartbeats unless `op` is 1.
    ///
    /// # Panics
    ///
    /// Panics on timeout, disconnect, or an unexpected opcode.
    pub async fn expect_op(&mut self, op: u64) -> serde_json::Value {
        loop {
            let frame = self
                .recv_json()
                .await
                .unwrap_or_else(|| panic!("client disconnected while waiting for op {op}"));
            let got = frame["op"].as_u64();
            if got == Some(op) {
                return frame;
            }
            assert_eq!(got, Some(1), "expected op {op}, got {frame}");
        }
    }

    /// Wait until the client closes the connection, discarding frames.
    ///
    /// # Panics
    ///
    /// Panics if the client stays connected past [`SESSION_TIMEOUT`].
    pub async fn expect_disconnect(&mut self) {
        while self.recv_json().await.is_some() {}
    }
}

async fn accept_session(stream: TcpStream) -> Option<MockSession> {
    let mut request_uri = String::new();
    let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        request_uri = req.uri().to_string();
        Ok::<Response, ErrorResponse>(resp)
    })
    .await
    .ok()?;
    debug!(uri = %request_uri, "Mock gateway accepted connection");

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (mut sink, mut source) = ws.split();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = outbound_rx.recv() => match frame {
                    Some(ServerFrame::Text(text)) => {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(ServerFrame::Close(code, reason)) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        let _ = sink.send(Message::Close(Some(frame))).await;
                        break;
                    }
                    Some(ServerFrame::Drop) | None => break,
                },
                incoming = source.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(value) = serde_json::from_str(text.as_str()) {
                            let _ = inbound_tx.send(value);
                        }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
        // Dropping both halves closes the socket and ends `inbound`.
    });

    Some(MockSession {
        request_uri,
        outbound: outbound_tx,
        inbound: inbound_rx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[tokio::test]
    async fn test_session_roundtrip() {
        let gateway = MockGateway::start().await;
        let url = format!("{}/?v=10&encoding=json", gateway.url());

        let client = tokio::spawn(async move {
            let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
            let hello = ws.next().await.unwrap().unwrap();
            let value: serde_json::Value = serde_json::from_str(hello.to_text().unwrap()).unwrap();
            assert_eq!(value["op"], 10);
            ws.send(Message::Text(r#"{"op":2,"d":{"token":"t"}}"#.into()))
                .await
                .unwrap();
            // Wait for the server close.
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let mut session = gateway.next_session().await;
        assert_eq!(session.request_uri, "/?v=10&encoding=json");
        session.send_json(fixtures::hello(1000));
        let identify = session.expect_op(2).await;
        assert_eq!(identify["d"]["token"], "t");
        session.close(4000, "bye");

        client.await.unwrap();
    }
}
