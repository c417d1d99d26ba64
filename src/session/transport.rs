use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Opaque credential material handed over by the transport.
///
/// The relay never inspects it; it is stored verbatim so a restart can
/// resume the session without pairing again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCredentials(pub serde_json::Value);

/// Why the transport closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The account removed this device. Re-pairing needs an operator.
    LoggedOut,
    /// Anything else (network drop, server restart, protocol error).
    Lost(String),
}

/// One group conversation the paired account belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    /// Conversation handle, usable as the relay recipient.
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Member count.
    #[serde(default)]
    pub participants: usize,
}

/// Connection-level notifications pushed by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A pairing credential (QR payload) is ready to be shown to a human.
    PairingCode(String),
    /// Handshake completed; the session can send.
    Opened,
    /// The connection closed.
    Closed(CloseReason),
    /// The pairing attempt was given up by the transport.
    PairingAbandoned,
    /// Credentials changed and should be persisted.
    CredentialsUpdated(SessionCredentials),
    /// A message arrived from the network. Logged only.
    Inbound { sender: String, text: String },
    /// Reply to a group listing request.
    Groups(Vec<GroupSummary>),
}

/// Session-based messaging transport contract.
///
/// `connect` starts a handshake and returns once the attempt is under way;
/// progress arrives through `events`. Implementations must not report the
/// same closure twice.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stable transport identifier used in logs.
    fn id(&self) -> &'static str;

    /// Open the connection and start a handshake, resuming from
    /// `credentials` when present.
    async fn connect(
        &self,
        credentials: Option<SessionCredentials>,
        events: mpsc::Sender<TransportEvent>,
    ) -> anyhow::Result<()>;

    /// Deliver one text message to `recipient`.
    async fn send_text(&self, recipient: &str, text: &str) -> anyhow::Result<()>;

    /// Close the connection without emitting a closure event.
    async fn close(&self) -> anyhow::Result<()>;
}
