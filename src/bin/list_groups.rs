//! Group lister.
//!
//! Connects to the messaging bridge with the relay's stored session and
//! prints every group the account belongs to, so the right handle can be
//! copied into `TEAM_RELAY_RECIPIENT`. Pairs first when no session exists.

use std::time::Duration;
use team_relay::config::RelayConfig;
use team_relay::session::bridge::BridgeTransport;
use team_relay::session::discovery::list_groups;
use team_relay::session::{CredentialStore, TerminalPresenter};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const DEFAULT_FILTER: &str = "team_relay=info";

/// How long to wait for the bridge (and the operator, when pairing).
const DEFAULT_WAIT_SECS: u64 = 180;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = RelayConfig::resolve_with(|key| std::env::var(key).ok())
        .and_then(|config| config.validate_bridge().map(|()| config));
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(2);
        }
    };

    let transport = BridgeTransport::new(config.session.bridge_url.clone());
    let credentials = CredentialStore::new(config.credentials_dir());
    let wait = Duration::from_secs(
        config
            .session
            .pairing_timeout_secs
            .unwrap_or(DEFAULT_WAIT_SECS),
    );
    tracing::info!(bridge = %config.session.bridge_url, "connecting");

    let groups = match list_groups(&transport, &credentials, &TerminalPresenter, wait).await {
        Ok(groups) => groups,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    if groups.is_empty() {
        println!("This account is not in any groups.");
        return Ok(());
    }
    println!("Groups:\n");
    for (n, group) in groups.iter().enumerate() {
        let name = if group.name.is_empty() {
            "(unnamed)"
        } else {
            group.name.as_str()
        };
        println!("{}. {name}", n + 1);
        println!("   handle:  {}", group.id);
        println!("   members: {}\n", group.participants);
    }
    println!("Set TEAM_RELAY_RECIPIENT to one of the handles above.");
    Ok(())
}
