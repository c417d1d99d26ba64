//! Messaging session lifecycle.
//!
//! [`SessionManager`] is the handle the rest of the relay uses: it reads the
//! current [`ConnectionState`] and sends text. All state changes happen in
//! one place, the [`SessionDriver`] task, which consumes transport events,
//! command requests and timers and applies them to the pure
//! [`SessionStateMachine`]. The driver holds the only `watch::Sender` for the
//! state, so there is a single writer by construction.

pub mod bridge;
mod credentials;
pub mod discovery;
mod presenter;
mod state;
mod transport;

pub use credentials::CredentialStore;
pub use presenter::{LogPresenter, PairingPresenter, TerminalPresenter};
pub use state::{
    ConnectionState, RejectedInput, SessionEffect, SessionInput, SessionStateMachine, Step,
};
pub use transport::{CloseReason, GroupSummary, SessionCredentials, Transport, TransportEvent};

use crate::error::SendError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Capacity of the transport event channel.
const EVENT_QUEUE_SIZE: usize = 64;

/// Delay before re-attempting a handshake after an unexpected close.
///
/// Fixed by default. With `max` set, the delay doubles on every attempt up
/// to `max` and resets once a handshake succeeds.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Option<Duration>,
    attempts: u32,
}

impl ReconnectBackoff {
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base: delay,
            max: None,
            attempts: 0,
        }
    }

    #[must_use]
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: Some(max.max(base)),
            attempts: 0,
        }
    }

    /// Delay to apply to the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = match self.max {
            None => self.base,
            Some(max) => {
                let factor = 1u32.checked_shl(self.attempts.min(16)).unwrap_or(u32::MAX);
                self.base.saturating_mul(factor).min(max)
            }
        };
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// Session settings taken from the relay config.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Group conversation handle every message goes to.
    pub recipient: String,
    pub backoff: ReconnectBackoff,
    /// Give up on a pairing attempt after this long. `None` waits forever.
    pub pairing_timeout: Option<Duration>,
}

enum SessionCommand {
    Initialize,
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to the single messaging session.
#[derive(Clone)]
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    recipient: Arc<str>,
    state_rx: watch::Receiver<ConnectionState>,
    command_tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionManager {
    /// Build the handle and the driver that must be spawned to run it.
    pub fn new(
        transport: Arc<dyn Transport>,
        presenter: Arc<dyn PairingPresenter>,
        credentials: CredentialStore,
        settings: SessionSettings,
    ) -> (Self, SessionDriver) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_SIZE);

        let manager = Self {
            transport: Arc::clone(&transport),
            recipient: Arc::from(settings.recipient.as_str()),
            state_rx,
            command_tx,
        };
        let driver = SessionDriver {
            machine: SessionStateMachine::new(),
            state_tx,
            transport,
            presenter,
            credentials,
            backoff: settings.backoff,
            pairing_timeout: settings.pairing_timeout,
            events_tx,
            events_rx,
            command_rx,
            reconnect_at: None,
            pairing_deadline: None,
        };
        (manager, driver)
    }

    #[must_use]
    pub fn current_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch channel for state changes (health reporting, tests).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    /// Start pairing (Disconnected -> Pairing).
    pub fn initialize(&self) {
        if self.command_tx.send(SessionCommand::Initialize).is_err() {
            warn!("session driver is not running; initialize ignored");
        }
    }

    /// Send `text` to the configured recipient.
    ///
    /// Fails with [`SendError::NotConnected`] unless the session is
    /// `Connected`. Never panics.
    pub async fn send(&self, text: &str) -> Result<(), SendError> {
        let state = self.current_state();
        if state != ConnectionState::Connected {
            return Err(SendError::NotConnected(state));
        }
        self.transport
            .send_text(&self.recipient, text)
            .await
            .map_err(|e| SendError::Transport(e.to_string()))
    }

    /// Close the session and wait for the driver to stop.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.command_tx.send(SessionCommand::Shutdown(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.await;
    }
}

/// Owns the state machine; the only writer of [`ConnectionState`].
pub struct SessionDriver {
    machine: SessionStateMachine,
    state_tx: watch::Sender<ConnectionState>,
    transport: Arc<dyn Transport>,
    presenter: Arc<dyn PairingPresenter>,
    credentials: CredentialStore,
    backoff: ReconnectBackoff,
    pairing_timeout: Option<Duration>,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: mpsc::Receiver<TransportEvent>,
    command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    reconnect_at: Option<Instant>,
    pairing_deadline: Option<Instant>,
}

impl SessionDriver {
    /// Run until shutdown is requested or every manager handle is dropped.
    pub async fn run(mut self) {
        info!(transport = self.transport.id(), "session driver started");
        loop {
            let reconnect_at = self.reconnect_at;
            let pairing_deadline = self.pairing_deadline;

            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(SessionCommand::Initialize) => self.step(SessionInput::Initialize).await,
                    Some(SessionCommand::Shutdown(ack)) => {
                        self.step(SessionInput::Shutdown).await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        self.step(SessionInput::Shutdown).await;
                        break;
                    }
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
                _ = sleep_until_opt(reconnect_at) => {
                    self.reconnect_at = None;
                    self.step(SessionInput::BackoffElapsed).await;
                }
                _ = sleep_until_opt(pairing_deadline) => {
                    self.pairing_deadline = None;
                    warn!("pairing was not completed in time; abandoning");
                    self.step(SessionInput::PairingAbandoned).await;
                }
            }
        }
        info!("session driver stopped");
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PairingCode(code) => {
                if self.machine.state() == ConnectionState::Pairing {
                    self.presenter.present(&code);
                } else {
                    debug!(state = %self.machine.state(), "ignoring pairing code outside pairing");
                }
            }
            TransportEvent::Opened => self.step(SessionInput::HandshakeSucceeded).await,
            TransportEvent::Closed(CloseReason::LoggedOut) => {
                warn!("transport reports this device was logged out");
                self.step(SessionInput::LoggedOut).await;
            }
            TransportEvent::Closed(CloseReason::Lost(reason)) => {
                warn!(%reason, "transport connection closed");
                self.step(SessionInput::ConnectionLost).await;
            }
            TransportEvent::PairingAbandoned => self.step(SessionInput::PairingAbandoned).await,
            TransportEvent::CredentialsUpdated(credentials) => {
                if let Err(e) = self.credentials.save(&credentials) {
                    error!("cannot persist session credentials: {e}");
                }
            }
            TransportEvent::Inbound { sender, text } => {
                debug!(%sender, %text, "inbound message ignored");
            }
            TransportEvent::Groups(groups) => {
                debug!(count = groups.len(), "group listing ignored by the session");
            }
        }
    }

    async fn step(&mut self, input: SessionInput) {
        let mut pending = Some(input);
        while let Some(input) = pending.take() {
            let step = match self.machine.apply(input) {
                Ok(step) => step,
                Err(rejected) => {
                    debug!("{rejected}");
                    return;
                }
            };

            if step.from != step.to {
                info!(from = %step.from, to = %step.to, "session state changed");
                self.state_tx.send_replace(step.to);
            }

            match step.effect {
                SessionEffect::Nothing => {}
                SessionEffect::StartHandshake => {
                    if !self.start_handshake().await {
                        pending = Some(SessionInput::ConnectionLost);
                    }
                }
                SessionEffect::ScheduleReconnect => {
                    self.pairing_deadline = None;
                    let delay = self.backoff.next_delay();
                    info!("re-attempting handshake in {}ms", delay.as_millis());
                    self.reconnect_at = Some(Instant::now() + delay);
                }
                SessionEffect::MarkConnected => {
                    self.disarm_timers();
                    self.backoff.reset();
                }
                SessionEffect::ClearCredentials => {
                    self.disarm_timers();
                    if let Err(e) = self.transport.close().await {
                        warn!("transport close failed: {e}");
                    }
                    if let Err(e) = self.credentials.clear() {
                        error!("cannot clear session credentials: {e}");
                    }
                    warn!("session logged out; operator must pair again");
                }
                SessionEffect::CloseTransport => {
                    self.disarm_timers();
                    if let Err(e) = self.transport.close().await {
                        warn!("transport close failed: {e}");
                    }
                }
            }
        }
    }

    /// Returns `false` when the connection attempt failed outright.
    async fn start_handshake(&mut self) -> bool {
        let credentials = match self.credentials.load() {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!("ignoring unreadable session credentials: {e}");
                None
            }
        };
        if credentials.is_some() {
            debug!("resuming session from stored credentials");
        }

        self.pairing_deadline = self.pairing_timeout.map(|t| Instant::now() + t);
        match self
            .transport
            .connect(credentials, self.events_tx.clone())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!("handshake attempt failed: {e}");
                false
            }
        }
    }

    fn disarm_timers(&mut self) {
        self.reconnect_at = None;
        self.pairing_deadline = None;
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn fixed_backoff_never_grows() {
        let mut backoff = ReconnectBackoff::fixed(Duration::from_secs(5));
        for _ in 0..4 {
            assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        }
    }

    #[test]
    fn exponential_backoff_is_capped_and_resets() {
        let mut backoff =
            ReconnectBackoff::exponential(Duration::from_secs(2), Duration::from_secs(10));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 10, 10]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }
}
