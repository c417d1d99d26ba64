//! Connection lifecycle state machine.
//!
//! Pure and synchronous: the session driver feeds it inputs derived from
//! transport events and timers, then carries out the returned effect.

use serde::Serialize;
use std::fmt;

/// Lifecycle of the single outbound messaging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Pairing,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub const ALL: [ConnectionState; 4] = [
        ConnectionState::Disconnected,
        ConnectionState::Pairing,
        ConnectionState::Connected,
        ConnectionState::Reconnecting,
    ];

    /// Whether `self -> next` is one of the permitted edges.
    ///
    /// Every state may drop to `Disconnected` on process shutdown.
    #[must_use]
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Pairing)
                | (Pairing, Connected)
                | (Pairing, Disconnected)
                | (Connected, Reconnecting)
                | (Reconnecting, Pairing)
                | (Connected, Disconnected)
                | (Reconnecting, Disconnected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Pairing => "pairing",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Inputs the driver feeds into the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    /// Operator/runtime asked to bring the session up.
    Initialize,
    /// Transport reported the handshake completed.
    HandshakeSucceeded,
    /// Pairing was abandoned (by the transport or by the pairing timeout).
    PairingAbandoned,
    /// Transport closed because the account logged this device out.
    LoggedOut,
    /// Transport closed for any other reason.
    ConnectionLost,
    /// The reconnect backoff timer fired.
    BackoffElapsed,
    /// Process shutdown.
    Shutdown,
}

/// Side effect the driver must perform after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEffect {
    Nothing,
    /// Open the transport and start a handshake.
    StartHandshake,
    /// Arm the backoff timer; the handshake is retried when it fires.
    ScheduleReconnect,
    /// Handshake is done; disarm timers and reset backoff.
    MarkConnected,
    /// Stored credentials are no longer valid. Close the transport, wipe them and stop.
    ClearCredentials,
    /// Close the transport and stop.
    CloseTransport,
}

/// A step that was not accepted in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("input {input:?} not accepted in state {state}")]
pub struct RejectedInput {
    pub state: ConnectionState,
    pub input: SessionInput,
}

/// Outcome of an accepted step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub effect: SessionEffect,
}

#[derive(Debug, Default)]
pub struct SessionStateMachine {
    state: ConnectionState,
}

impl SessionStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Apply `input`. On success the state has moved along a permitted edge
    /// (or stayed put) and the returned effect must be carried out.
    pub fn apply(&mut self, input: SessionInput) -> Result<Step, RejectedInput> {
        use ConnectionState::*;
        use SessionEffect::*;
        use SessionInput::*;

        let from = self.state;
        let (to, effect) = match (from, input) {
            (Disconnected, Initialize) => (Pairing, StartHandshake),
            (Pairing, HandshakeSucceeded) => (Connected, MarkConnected),
            (Pairing, PairingAbandoned) => (Disconnected, CloseTransport),
            (Pairing, LoggedOut) => (Disconnected, ClearCredentials),
            // Handshake attempt failed mid-pairing: stay and retry after backoff.
            (Pairing, ConnectionLost) => (Pairing, ScheduleReconnect),
            (Pairing, BackoffElapsed) => (Pairing, StartHandshake),
            (Connected, ConnectionLost) => (Reconnecting, ScheduleReconnect),
            (Connected, LoggedOut) => (Disconnected, ClearCredentials),
            (Reconnecting, BackoffElapsed) => (Pairing, StartHandshake),
            (Disconnected, Shutdown) => (Disconnected, Nothing),
            (_, Shutdown) => (Disconnected, CloseTransport),
            _ => return Err(RejectedInput { state: from, input }),
        };

        debug_assert!(from == to || from.can_transition_to(to));
        self.state = to;
        Ok(Step { from, to, effect })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    const INPUTS: [SessionInput; 7] = [
        SessionInput::Initialize,
        SessionInput::HandshakeSucceeded,
        SessionInput::PairingAbandoned,
        SessionInput::LoggedOut,
        SessionInput::ConnectionLost,
        SessionInput::BackoffElapsed,
        SessionInput::Shutdown,
    ];

    fn machine_in(state: ConnectionState) -> SessionStateMachine {
        SessionStateMachine { state }
    }

    #[test]
    fn every_accepted_step_follows_a_permitted_edge() {
        for state in ConnectionState::ALL {
            for input in INPUTS {
                let mut machine = machine_in(state);
                if let Ok(step) = machine.apply(input) {
                    assert!(
                        step.from == step.to || step.from.can_transition_to(step.to),
                        "{:?} --{input:?}--> {:?} is not a permitted edge",
                        step.from,
                        step.to
                    );
                    assert_eq!(machine.state(), step.to);
                } else {
                    assert_eq!(machine.state(), state, "rejected input must not move state");
                }
            }
        }
    }

    #[test]
    fn happy_path_and_reconnect_cycle() {
        let mut machine = SessionStateMachine::new();
        assert_eq!(
            machine.apply(SessionInput::Initialize).unwrap().effect,
            SessionEffect::StartHandshake
        );
        machine.apply(SessionInput::HandshakeSucceeded).unwrap();
        assert_eq!(machine.state(), ConnectionState::Connected);

        let step = machine.apply(SessionInput::ConnectionLost).unwrap();
        assert_eq!(step.to, ConnectionState::Reconnecting);
        assert_eq!(step.effect, SessionEffect::ScheduleReconnect);

        let step = machine.apply(SessionInput::BackoffElapsed).unwrap();
        assert_eq!(step.to, ConnectionState::Pairing);
        assert_eq!(step.effect, SessionEffect::StartHandshake);
    }

    #[test]
    fn logout_while_connected_is_terminal() {
        let mut machine = machine_in(ConnectionState::Connected);
        let step = machine.apply(SessionInput::LoggedOut).unwrap();
        assert_eq!(step.to, ConnectionState::Disconnected);
        assert_eq!(step.effect, SessionEffect::ClearCredentials);

        // No automatic way back: timers and transport noise are rejected.
        assert!(machine.apply(SessionInput::BackoffElapsed).is_err());
        assert!(machine.apply(SessionInput::ConnectionLost).is_err());
        assert!(machine.apply(SessionInput::HandshakeSucceeded).is_err());
        assert_eq!(machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn reconnecting_cannot_skip_pairing() {
        let mut machine = machine_in(ConnectionState::Reconnecting);
        assert!(machine.apply(SessionInput::HandshakeSucceeded).is_err());
        assert!(machine.apply(SessionInput::Initialize).is_err());
        assert_eq!(machine.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn shutdown_always_lands_disconnected() {
        for state in ConnectionState::ALL {
            let mut machine = machine_in(state);
            let step = machine.apply(SessionInput::Shutdown).unwrap();
            assert_eq!(step.to, ConnectionState::Disconnected);
        }
    }

    #[test]
    fn edge_table() {
        use ConnectionState::*;
        assert!(Disconnected.can_transition_to(Pairing));
        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Reconnecting.can_transition_to(Connected));
        assert!(!Pairing.can_transition_to(Reconnecting));
    }
}
