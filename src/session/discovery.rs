//! One-shot group discovery.
//!
//! Opens a bridge session with the stored credentials (pairing first when
//! there are none), asks for the group list and closes again. Used by the
//! `team-relay-groups` binary so the operator can find the handle to put in
//! `TEAM_RELAY_RECIPIENT`.

use crate::error::{RelayError, Result};
use crate::session::bridge::BridgeTransport;
use crate::session::{
    CloseReason, CredentialStore, GroupSummary, PairingPresenter, Transport, TransportEvent,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// List the groups visible to the paired account.
///
/// Fails when the bridge closes, logs the device out, or does not answer
/// within `wait`. The transport is closed on every path.
pub async fn list_groups(
    transport: &BridgeTransport,
    credentials: &CredentialStore,
    presenter: &dyn PairingPresenter,
    wait: Duration,
) -> Result<Vec<GroupSummary>> {
    let stored = credentials.load().unwrap_or_else(|e| {
        warn!("ignoring unreadable session credentials: {e}");
        None
    });
    if stored.is_none() {
        info!("no stored session; the device must be paired first");
    }

    let (tx, rx) = mpsc::channel(16);
    transport
        .connect(stored, tx)
        .await
        .map_err(|e| RelayError::Discovery(format!("cannot reach bridge: {e}")))?;

    let outcome = tokio::time::timeout(wait, await_groups(transport, credentials, presenter, rx))
        .await
        .unwrap_or_else(|_| {
            Err(RelayError::Discovery(format!(
                "no group list within {wait:?}"
            )))
        });

    if let Err(e) = transport.close().await {
        warn!("transport close failed: {e}");
    }
    outcome
}

async fn await_groups(
    transport: &BridgeTransport,
    credentials: &CredentialStore,
    presenter: &dyn PairingPresenter,
    mut rx: mpsc::Receiver<TransportEvent>,
) -> Result<Vec<GroupSummary>> {
    while let Some(event) = rx.recv().await {
        match event {
            TransportEvent::PairingCode(code) => presenter.present(&code),
            TransportEvent::CredentialsUpdated(updated) => {
                if let Err(e) = credentials.save(&updated) {
                    error!("cannot persist session credentials: {e}");
                }
            }
            TransportEvent::Opened => {
                info!("connected; fetching groups");
                transport
                    .request_groups()
                    .await
                    .map_err(|e| RelayError::Discovery(format!("cannot request groups: {e}")))?;
            }
            TransportEvent::Groups(groups) => return Ok(groups),
            TransportEvent::Closed(CloseReason::LoggedOut) => {
                if let Err(e) = credentials.clear() {
                    error!("cannot clear session credentials: {e}");
                }
                return Err(RelayError::Discovery(
                    "device was logged out; pair again".to_owned(),
                ));
            }
            TransportEvent::Closed(CloseReason::Lost(reason)) => {
                return Err(RelayError::Discovery(format!("bridge closed: {reason}")));
            }
            TransportEvent::PairingAbandoned => {
                return Err(RelayError::Discovery("pairing was abandoned".to_owned()));
            }
            TransportEvent::Inbound { sender, .. } => {
                debug!(%sender, "inbound message ignored");
            }
        }
    }
    Err(RelayError::Discovery("bridge event stream ended".to_owned()))
}
