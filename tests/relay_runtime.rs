#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end runtime tests: wiring, HTTP surface and ordered shutdown.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use team_relay::clock::ManualClock;
use team_relay::config::{RelayConfig, env};
use team_relay::error::{ConfigError, QueryError, RelayError};
use team_relay::records::{AvailabilityRow, DailyLogRow, TaskRow};
use team_relay::runtime::{Relay, RelayParts};
use team_relay::session::{
    ConnectionState, LogPresenter, SessionCredentials, Transport, TransportEvent,
};
use team_relay::store::RecordSource;
use tokio::sync::mpsc;

/// Transport that opens as soon as it is asked to connect.
#[derive(Default)]
struct InstantTransport {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Transport for InstantTransport {
    fn id(&self) -> &'static str {
        "instant"
    }

    async fn connect(
        &self,
        _credentials: Option<SessionCredentials>,
        events: mpsc::Sender<TransportEvent>,
    ) -> anyhow::Result<()> {
        events.try_send(TransportEvent::Opened)?;
        Ok(())
    }

    async fn send_text(&self, recipient: &str, text: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_owned(), text.to_owned()));
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct OneTaskSource {
    task: TaskRow,
}

#[async_trait]
impl RecordSource for OneTaskSource {
    async fn tasks_since(&self, since: DateTime<Utc>) -> Result<Vec<TaskRow>, QueryError> {
        Ok(if self.task.updated_at >= since {
            vec![self.task.clone()]
        } else {
            Vec::new()
        })
    }

    async fn availability_since(
        &self,
        _since: DateTime<Utc>,
    ) -> Result<Vec<AvailabilityRow>, QueryError> {
        Ok(Vec::new())
    }

    async fn daily_logs_since(
        &self,
        _since: DateTime<Utc>,
    ) -> Result<Vec<DailyLogRow>, QueryError> {
        Ok(Vec::new())
    }
}

fn config(credentials_dir: &std::path::Path) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.session.recipient = "team@g.us".to_owned();
    config.session.credentials_dir = Some(credentials_dir.to_path_buf());
    config.store.url = "http://127.0.0.1:9".to_owned();
    config.store.api_key = "unused".to_owned();
    config.poll.interval_minutes = 5;
    config.poll.initial_delay_secs = 1;
    config.dispatch.send_interval_ms = 10;
    config.http.host = "127.0.0.1".to_owned();
    config.http.port = 0;
    config
}

async fn eventually<F: Fn() -> bool>(check: F) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn relay_forwards_new_task_and_serves_status() {
    let dir = tempfile::tempdir().unwrap();
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    let transport = Arc::new(InstantTransport::default());
    let source = OneTaskSource {
        task: TaskRow {
            id: "t1".to_owned(),
            title: "Prepare demo".to_owned(),
            assigned_member: "hysam".to_owned(),
            completed: false,
            created_at: start,
            completed_at: None,
            updated_at: start,
        },
    };

    let handle = Relay::start(
        &config(dir.path()),
        RelayParts {
            source: Arc::new(source),
            transport: transport.clone(),
            presenter: Arc::new(LogPresenter),
            clock: Arc::new(ManualClock::new(start)),
        },
    )
    .await
    .unwrap();

    let mut state = handle.session().subscribe();
    state
        .wait_for(|s| *s == ConnectionState::Connected)
        .await
        .unwrap();

    eventually(|| !transport.sent.lock().unwrap().is_empty()).await;
    assert_eq!(
        transport.sent.lock().unwrap()[0],
        (
            "team@g.us".to_owned(),
            "📋 Hysam added task: Prepare demo".to_owned()
        )
    );

    let base = format!("http://{}", handle.http_addr().unwrap());
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert!(health["timestamp"].is_string());

    let banner: Value = client.get(&base).send().await.unwrap().json().await.unwrap();
    assert_eq!(banner["status"], "running");
    assert_eq!(banner["service"], "team-relay");

    let status: Value = client
        .get(format!("{base}/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["connection"], "connected");
    assert_eq!(status["dispatch"]["sent"], 1);
    assert_eq!(status["dispatch"]["dropped"], 0);
    let tables = status["tables"].as_array().unwrap();
    assert_eq!(tables.len(), 3);
    assert!(tables.iter().all(|t| !t["last_success"].is_null()));

    drop(client);
    let session = handle.session().clone();
    handle.shutdown().await;
    assert_eq!(session.current_state(), ConnectionState::Disconnected);
    assert!(reqwest::get(format!("{base}/health")).await.is_err());
}

#[tokio::test]
async fn http_surface_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.http.enabled = false;
    let start = Utc::now();

    let handle = Relay::start(
        &config,
        RelayParts {
            source: Arc::new(OneTaskSource {
                task: TaskRow {
                    id: "old".to_owned(),
                    title: "Before startup".to_owned(),
                    assigned_member: "alan".to_owned(),
                    completed: false,
                    created_at: start - chrono::Duration::hours(1),
                    completed_at: None,
                    updated_at: start - chrono::Duration::hours(1),
                },
            }),
            transport: Arc::new(InstantTransport::default()),
            presenter: Arc::new(LogPresenter),
            clock: Arc::new(ManualClock::new(start)),
        },
    )
    .await
    .unwrap();

    assert!(handle.http_addr().is_none());
    handle.shutdown().await;
}

fn idle_parts() -> RelayParts {
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    RelayParts {
        source: Arc::new(OneTaskSource {
            task: TaskRow {
                id: "idle".to_owned(),
                title: "Never sent".to_owned(),
                assigned_member: "alan".to_owned(),
                completed: false,
                created_at: start,
                completed_at: None,
                updated_at: start,
            },
        }),
        transport: Arc::new(InstantTransport::default()),
        presenter: Arc::new(LogPresenter),
        clock: Arc::new(ManualClock::new(start)),
    }
}

#[tokio::test]
async fn invalid_config_is_rejected_before_anything_starts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.session.recipient = String::new();

    let err = Relay::start(&config, idle_parts()).await.err().unwrap();
    assert!(matches!(
        err,
        RelayError::Config(ConfigError::Missing(key)) if key == env::RECIPIENT
    ));
}

#[tokio::test]
async fn occupied_http_port_is_a_bind_error() {
    let dir = tempfile::tempdir().unwrap();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = config(dir.path());
    config.http.port = taken.local_addr().unwrap().port();

    let err = Relay::start(&config, idle_parts()).await.err().unwrap();
    match err {
        RelayError::Bind { addr, .. } => assert!(addr.starts_with("127.0.0.1:")),
        other => panic!("expected bind error, got {other}"),
    }
}
