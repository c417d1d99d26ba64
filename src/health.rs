//! Read-only health and status HTTP surface.
//!
//! Routes:
//! - `GET /` service banner with uptime
//! - `GET /health` liveness probe
//! - `GET /status` (also `/bot/status`) session state, watermarks and
//!   dispatch counters

use crate::clock::Clock;
use crate::dispatch::{DispatchCounts, DispatchStats};
use crate::poller::{SharedWatermarks, WatermarkEntry};
use crate::session::ConnectionState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const SERVICE_NAME: &str = "team-relay";

/// Everything `/status` reports, captured at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub service: &'static str,
    pub version: &'static str,
    pub connection: ConnectionState,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub tables: Vec<WatermarkEntry>,
    pub dispatch: DispatchCounts,
    pub timestamp: DateTime<Utc>,
}

/// Read-through view of state owned by the session, poller and dispatcher.
#[derive(Clone)]
pub struct HealthReporter {
    clock: Arc<dyn Clock>,
    started_at: DateTime<Utc>,
    state: watch::Receiver<ConnectionState>,
    watermarks: SharedWatermarks,
    dispatch: Arc<DispatchStats>,
}

impl HealthReporter {
    pub fn new(
        clock: Arc<dyn Clock>,
        state: watch::Receiver<ConnectionState>,
        watermarks: SharedWatermarks,
        dispatch: Arc<DispatchStats>,
    ) -> Self {
        let started_at = clock.now();
        Self {
            clock,
            started_at,
            state,
            watermarks,
            dispatch,
        }
    }

    #[must_use]
    pub fn uptime_secs(&self) -> i64 {
        (self.clock.now() - self.started_at).num_seconds().max(0)
    }

    #[must_use]
    pub fn report(&self) -> StatusReport {
        let tables = self
            .watermarks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot();
        StatusReport {
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            connection: *self.state.borrow(),
            started_at: self.started_at,
            uptime_secs: self.uptime_secs(),
            tables,
            dispatch: self.dispatch.snapshot(),
            timestamp: self.clock.now(),
        }
    }

    /// Axum router serving the health routes.
    pub fn router(self) -> Router {
        Router::new()
            .route("/", get(banner))
            .route("/health", get(health))
            .route("/status", get(status))
            .route("/bot/status", get(status))
            .with_state(self)
    }

    /// Serve on `listener` until `cancel` fires.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> anyhow::Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!("health endpoint listening on http://{local_addr}");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;
        tracing::info!("health endpoint stopped");
        Ok(())
    }
}

async fn banner(State(reporter): State<HealthReporter>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "running",
        "service": SERVICE_NAME,
        "timestamp": reporter.clock.now(),
        "uptime": reporter.uptime_secs(),
    }))
}

async fn health(State(reporter): State<HealthReporter>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": reporter.clock.now(),
    }))
}

async fn status(State(reporter): State<HealthReporter>) -> impl IntoResponse {
    Json(reporter.report())
}
