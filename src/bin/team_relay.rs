//! Team relay daemon.
//!
//! Polls the work-tracking store and forwards task, availability and
//! check-in updates to the configured group conversation. Configuration
//! comes from `TEAM_RELAY_*` environment variables, optionally layered over
//! the TOML file named by `TEAM_RELAY_CONFIG`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use team_relay::clock::SystemClock;
use team_relay::config::{PresenterKind, RelayConfig};
use team_relay::runtime::{RelayParts, run_until, shutdown_signal};
use team_relay::session::bridge::BridgeTransport;
use team_relay::session::{LogPresenter, PairingPresenter, TerminalPresenter};
use team_relay::store::{RestRecordSource, RestStoreConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const DEFAULT_FILTER: &str = "team_relay=info,tower_http=warn,hyper=warn";

/// Install the stderr subscriber, plus a daily rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "team-relay.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match RelayConfig::load() {
        Ok(config) => config,
        Err(e) => {
            let _guard = init_tracing(None);
            tracing::error!("{e}");
            std::process::exit(2);
        }
    };
    let _guard = init_tracing(config.logging.log_dir.as_deref());

    tracing::info!("team-relay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        interval_minutes = config.poll.interval_minutes,
        bridge = %config.session.bridge_url,
        "configuration loaded"
    );

    let source = RestRecordSource::new(&RestStoreConfig {
        base_url: config.store.url.clone(),
        api_key: config.store.api_key.clone(),
        timeout: Duration::from_secs(config.store.timeout_secs),
    })?;
    let presenter: Arc<dyn PairingPresenter> = match config.session.presenter {
        PresenterKind::Terminal => Arc::new(TerminalPresenter),
        PresenterKind::Log => Arc::new(LogPresenter),
    };

    let parts = RelayParts {
        source: Arc::new(source),
        transport: Arc::new(BridgeTransport::new(config.session.bridge_url.clone())),
        presenter,
        clock: Arc::new(SystemClock),
    };

    run_until(&config, parts, shutdown_signal())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "team-relay exited with error");
            e
        })?;

    tracing::info!("team-relay shut down cleanly");
    Ok(())
}
