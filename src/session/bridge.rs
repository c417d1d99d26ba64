//! Websocket bridge transport.
//!
//! Talks to a local messaging bridge process that owns the network-level
//! protocol. Frames are JSON objects tagged by `type`:
//!
//! | direction | frame |
//! |-----------|-------|
//! | bridge → relay | `qr {code}`, `open`, `close {reason}`, `creds {credentials}`, `pairing_abandoned`, `message {from, text}`, `groups {groups}` |
//! | relay → bridge | `hello {credentials}`, `send {to, text}`, `list_groups` |
//!
//! Each entry of `groups` is `{id, name, participants}`.
//!
//! A `close` frame with reason `logged_out` is a logout; anything else,
//! including the socket ending without a frame, is a lost connection.

use crate::session::{CloseReason, GroupSummary, SessionCredentials, Transport, TransportEvent};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Mutex as StdMutex;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type BridgeSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const LOGGED_OUT_REASON: &str = "logged_out";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeFrame {
    Qr {
        code: String,
    },
    Open,
    Close {
        #[serde(default)]
        reason: Option<String>,
    },
    Creds {
        credentials: serde_json::Value,
    },
    PairingAbandoned,
    Message {
        from: String,
        #[serde(default)]
        text: String,
    },
    Groups {
        #[serde(default)]
        groups: Vec<GroupSummary>,
    },
}

/// Decode one text frame. Unknown or malformed frames yield `None`.
#[must_use]
pub fn parse_frame(raw: &str) -> Option<TransportEvent> {
    let frame: BridgeFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("ignoring bridge frame: {e}");
            return None;
        }
    };
    let event = match frame {
        BridgeFrame::Qr { code } => TransportEvent::PairingCode(code),
        BridgeFrame::Open => TransportEvent::Opened,
        BridgeFrame::Close { reason } => match reason.as_deref() {
            Some(LOGGED_OUT_REASON) => TransportEvent::Closed(CloseReason::LoggedOut),
            Some(other) => TransportEvent::Closed(CloseReason::Lost(other.to_owned())),
            None => TransportEvent::Closed(CloseReason::Lost("closed by bridge".to_owned())),
        },
        BridgeFrame::Creds { credentials } => {
            TransportEvent::CredentialsUpdated(SessionCredentials(credentials))
        }
        BridgeFrame::PairingAbandoned => TransportEvent::PairingAbandoned,
        BridgeFrame::Message { from, text } => TransportEvent::Inbound { sender: from, text },
        BridgeFrame::Groups { groups } => TransportEvent::Groups(groups),
    };
    Some(event)
}

/// [`Transport`] over a websocket connection to the messaging bridge.
pub struct BridgeTransport {
    url: String,
    writer: Mutex<Option<SplitSink<BridgeSocket, Message>>>,
    reader: StdMutex<Option<JoinHandle<()>>>,
}

impl BridgeTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            writer: Mutex::new(None),
            reader: StdMutex::new(None),
        }
    }

    /// Ask the bridge for every group the account belongs to. The reply
    /// arrives as [`TransportEvent::Groups`].
    pub async fn request_groups(&self) -> anyhow::Result<()> {
        self.send_frame(json!({"type": "list_groups"})).await
    }

    async fn send_frame(&self, frame: serde_json::Value) -> anyhow::Result<()> {
        let mut guard = self.writer.lock().await;
        let Some(write) = guard.as_mut() else {
            anyhow::bail!("bridge connection is not open");
        };
        write.send(Message::Text(frame.to_string())).await?;
        Ok(())
    }

    fn stop_reader(&self) {
        let handle = self
            .reader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    fn id(&self) -> &'static str {
        "bridge"
    }

    async fn connect(
        &self,
        credentials: Option<SessionCredentials>,
        events: mpsc::Sender<TransportEvent>,
    ) -> anyhow::Result<()> {
        self.stop_reader();
        self.writer.lock().await.take();

        let (stream, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        let (mut write, read) = stream.split();

        let hello = json!({
            "type": "hello",
            "credentials": credentials.map(|c| c.0),
        });
        write.send(Message::Text(hello.to_string())).await?;

        *self.writer.lock().await = Some(write);
        let handle = tokio::spawn(forward_frames(read, events));
        *self.reader.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    async fn send_text(&self, recipient: &str, text: &str) -> anyhow::Result<()> {
        self.send_frame(json!({
            "type": "send",
            "to": recipient,
            "text": text,
        }))
        .await
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.stop_reader();
        let write = self.writer.lock().await.take();
        if let Some(mut write) = write {
            write.send(Message::Close(None)).await?;
        }
        Ok(())
    }
}

async fn forward_frames(
    mut read: SplitStream<BridgeSocket>,
    events: mpsc::Sender<TransportEvent>,
) {
    loop {
        let raw = match read.next().await {
            Some(Ok(Message::Text(text))) => text.to_string(),
            Some(Ok(Message::Close(_))) | None => {
                let closed = TransportEvent::Closed(CloseReason::Lost("bridge socket closed".to_owned()));
                let _ = events.send(closed).await;
                return;
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                warn!("bridge websocket error: {err}");
                let closed = TransportEvent::Closed(CloseReason::Lost(err.to_string()));
                let _ = events.send(closed).await;
                return;
            }
        };

        let Some(event) = parse_frame(&raw) else {
            continue;
        };
        let is_close = matches!(event, TransportEvent::Closed(_));
        if events.send(event).await.is_err() {
            debug!("session driver gone; stopping bridge reader");
            return;
        }
        if is_close {
            return;
        }
    }
}
