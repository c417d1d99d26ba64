//! Process wiring.
//!
//! [`Relay::start`] builds the session, dispatch queue, poller and health
//! server from a [`RelayConfig`] and spawns one task for each. The returned
//! [`RelayHandle`] stops them in order: scheduler first, then the dispatch
//! worker (its in-flight send completes), then the session, then HTTP.

use crate::clock::Clock;
use crate::config::RelayConfig;
use crate::dispatch::{DispatchQueue, MessageSink};
use crate::error::RelayError;
use crate::formatter::{MemberDirectory, MessageFormatter};
use crate::health::HealthReporter;
use crate::poller::{ChangePoller, PollerSettings, SharedWatermarks};
use crate::session::{
    CredentialStore, PairingPresenter, ReconnectBackoff, SessionManager, SessionSettings, Transport,
};
use crate::store::RecordSource;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// External collaborators the relay runs against.
pub struct RelayParts {
    pub source: Arc<dyn RecordSource>,
    pub transport: Arc<dyn Transport>,
    pub presenter: Arc<dyn PairingPresenter>,
    pub clock: Arc<dyn Clock>,
}

/// Entry point for starting the relay.
pub struct Relay;

impl Relay {
    /// Start every task. The session begins pairing immediately.
    ///
    /// The config is validated first, so nothing is spawned for a config
    /// that could not run.
    pub async fn start(config: &RelayConfig, parts: RelayParts) -> crate::Result<RelayHandle> {
        config.validate()?;
        let RelayParts {
            source,
            transport,
            presenter,
            clock,
        } = parts;

        let backoff_base = Duration::from_secs(config.session.reconnect_backoff_secs);
        let backoff = match config.session.reconnect_backoff_max_secs {
            Some(max) => ReconnectBackoff::exponential(backoff_base, Duration::from_secs(max)),
            None => ReconnectBackoff::fixed(backoff_base),
        };
        let credentials = CredentialStore::new(config.credentials_dir());
        info!(path = %credentials.path().display(), "session credential file");

        let (session, driver) = SessionManager::new(
            transport,
            presenter,
            credentials,
            SessionSettings {
                recipient: config.session.recipient.clone(),
                backoff,
                pairing_timeout: config.session.pairing_timeout_secs.map(Duration::from_secs),
            },
        );
        let session_task = tokio::spawn(driver.run());

        let sink: Arc<dyn MessageSink> = Arc::new(session.clone());
        let (queue, worker) = DispatchQueue::new(
            sink,
            Duration::from_millis(config.dispatch.send_interval_ms),
        );
        let dispatch_stats = queue.stats();

        let formatter = MessageFormatter::new(MemberDirectory::with_overrides(&config.members));
        let poller = ChangePoller::new(
            source,
            Arc::clone(&clock),
            formatter,
            queue,
            PollerSettings {
                interval: config.poll_interval(),
                initial_delay: Duration::from_secs(config.poll.initial_delay_secs),
            },
        );
        let watermarks = poller.watermarks();

        let reporter = HealthReporter::new(
            clock,
            session.subscribe(),
            Arc::clone(&watermarks),
            dispatch_stats,
        );

        let http_cancel = CancellationToken::new();
        let (http_task, http_addr) = if config.http.enabled {
            let addr = format!("{}:{}", config.http.host, config.http.port);
            let bound = tokio::net::TcpListener::bind(&addr)
                .await
                .and_then(|listener| listener.local_addr().map(|local| (listener, local)));
            let (listener, local_addr) = match bound {
                Ok(bound) => bound,
                Err(source) => {
                    session.shutdown().await;
                    return Err(RelayError::Bind { addr, source });
                }
            };
            let task = tokio::spawn(reporter.clone().serve(listener, http_cancel.clone()));
            (Some(task), Some(local_addr))
        } else {
            (None, None)
        };

        let poll_cancel = CancellationToken::new();
        let dispatch_cancel = CancellationToken::new();
        let poll_task = tokio::spawn(poller.run(poll_cancel.clone()));
        let dispatch_task = tokio::spawn(worker.run(dispatch_cancel.clone()));

        session.initialize();
        info!(recipient = %session.recipient(), "relay started");

        Ok(RelayHandle {
            session,
            reporter,
            watermarks,
            http_addr,
            poll: (poll_cancel, poll_task),
            dispatch: (dispatch_cancel, dispatch_task),
            session_task,
            http: (http_cancel, http_task),
        })
    }
}

/// Running relay.
pub struct RelayHandle {
    session: SessionManager,
    reporter: HealthReporter,
    watermarks: SharedWatermarks,
    http_addr: Option<SocketAddr>,
    poll: (CancellationToken, JoinHandle<()>),
    dispatch: (CancellationToken, JoinHandle<()>),
    session_task: JoinHandle<()>,
    http: (CancellationToken, Option<JoinHandle<anyhow::Result<()>>>),
}

impl RelayHandle {
    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    #[must_use]
    pub fn reporter(&self) -> &HealthReporter {
        &self.reporter
    }

    #[must_use]
    pub fn watermarks(&self) -> SharedWatermarks {
        Arc::clone(&self.watermarks)
    }

    /// Bound address of the health endpoint, when enabled.
    #[must_use]
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// Stop every task in shutdown order.
    pub async fn shutdown(self) {
        info!("shutting down relay");

        let (poll_cancel, poll_task) = self.poll;
        poll_cancel.cancel();
        if let Err(e) = poll_task.await {
            warn!("poller task ended abnormally: {e}");
        }

        let (dispatch_cancel, dispatch_task) = self.dispatch;
        dispatch_cancel.cancel();
        if let Err(e) = dispatch_task.await {
            warn!("dispatch task ended abnormally: {e}");
        }

        self.session.shutdown().await;
        if let Err(e) = self.session_task.await {
            warn!("session task ended abnormally: {e}");
        }

        let (http_cancel, http_task) = self.http;
        http_cancel.cancel();
        if let Some(task) = http_task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("health endpoint failed: {e}"),
                Err(e) => warn!("health endpoint task ended abnormally: {e}"),
            }
        }
        info!("relay stopped");
    }
}

/// Run until `shutdown` resolves, then stop cleanly.
pub async fn run_until<F>(config: &RelayConfig, parts: RelayParts, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()>,
{
    let handle = Relay::start(config, parts).await?;
    shutdown.await;
    handle.shutdown().await;
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}
