//! Scheduled change poller.
//!
//! Every cycle reads each monitored table for rows mutated at or after that
//! table's watermark, runs them through the recency window, renders the
//! accepted events and queues them for dispatch. A table's watermark moves
//! to the cycle start time only when its query succeeded; a failed table is
//! retried with a wider window on the next cycle.

use crate::clock::Clock;
use crate::dispatch::DispatchQueue;
use crate::error::QueryError;
use crate::events::{ChangeEvent, ChangeKind, OutboundMessage};
use crate::formatter::MessageFormatter;
use crate::recency::RecencyWindow;
use crate::records::MonitoredTable;
use crate::store::RecordSource;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-table poll boundary plus the last successful poll time.
#[derive(Debug, Clone)]
pub struct WatermarkCursor {
    marks: BTreeMap<MonitoredTable, DateTime<Utc>>,
    last_success: BTreeMap<MonitoredTable, DateTime<Utc>>,
}

/// One table's row in a watermark snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatermarkEntry {
    pub table: MonitoredTable,
    pub watermark: DateTime<Utc>,
    pub last_success: Option<DateTime<Utc>>,
}

impl WatermarkCursor {
    /// Every table starts at `now`, so rows older than startup are never
    /// replayed.
    #[must_use]
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            marks: MonitoredTable::ALL.iter().map(|t| (*t, now)).collect(),
            last_success: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn since(&self, table: MonitoredTable) -> DateTime<Utc> {
        self.marks.get(&table).copied().unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    #[must_use]
    pub fn last_success(&self, table: MonitoredTable) -> Option<DateTime<Utc>> {
        self.last_success.get(&table).copied()
    }

    /// Record a successful poll that started at `cycle_start`. The watermark
    /// never moves backwards.
    pub fn advance(&mut self, table: MonitoredTable, cycle_start: DateTime<Utc>) {
        let mark = self.marks.entry(table).or_insert(cycle_start);
        if cycle_start > *mark {
            *mark = cycle_start;
        }
        self.last_success.insert(table, cycle_start);
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<WatermarkEntry> {
        MonitoredTable::ALL
            .iter()
            .map(|table| WatermarkEntry {
                table: *table,
                watermark: self.since(*table),
                last_success: self.last_success(*table),
            })
            .collect()
    }
}

/// Cursor shared between the poller (writer) and the health reporter.
pub type SharedWatermarks = Arc<Mutex<WatermarkCursor>>;

/// What one table contributed to a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOutcome {
    pub table: MonitoredTable,
    pub rows: usize,
    pub events: usize,
}

/// Summary of one poll cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub tables: Vec<TableOutcome>,
    pub failures: Vec<QueryError>,
    /// Events queued for dispatch, in emission order.
    pub events: Vec<ChangeEvent>,
}

/// Poller settings.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Poll period; also the recency window width.
    pub interval: Duration,
    /// Wait before the first cycle.
    pub initial_delay: Duration,
}

pub struct ChangePoller {
    source: Arc<dyn RecordSource>,
    clock: Arc<dyn Clock>,
    formatter: MessageFormatter,
    queue: DispatchQueue,
    watermarks: SharedWatermarks,
    settings: PollerSettings,
}

impl ChangePoller {
    /// Build a poller whose watermarks start at the clock's current time.
    pub fn new(
        source: Arc<dyn RecordSource>,
        clock: Arc<dyn Clock>,
        formatter: MessageFormatter,
        queue: DispatchQueue,
        settings: PollerSettings,
    ) -> Self {
        let watermarks = Arc::new(Mutex::new(WatermarkCursor::starting_at(clock.now())));
        Self {
            source,
            clock,
            formatter,
            queue,
            watermarks,
            settings,
        }
    }

    #[must_use]
    pub fn watermarks(&self) -> SharedWatermarks {
        Arc::clone(&self.watermarks)
    }

    fn window(&self, now: DateTime<Utc>) -> RecencyWindow {
        let interval = chrono::Duration::from_std(self.settings.interval)
            .unwrap_or(chrono::Duration::MAX);
        RecencyWindow::new(now, interval)
    }

    fn since(&self, table: MonitoredTable) -> DateTime<Utc> {
        self.watermarks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .since(table)
    }

    /// Run a single poll cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = self.clock.now();
        let window = self.window(started_at);
        let mut report = CycleReport {
            started_at,
            tables: Vec::with_capacity(MonitoredTable::ALL.len()),
            failures: Vec::new(),
            events: Vec::new(),
        };
        let mut emitted: HashSet<(MonitoredTable, String, ChangeKind)> = HashSet::new();

        for table in MonitoredTable::ALL {
            let since = self.since(table);
            let fetched = match table {
                MonitoredTable::Tasks => self.source.tasks_since(since).await.map(|rows| {
                    let events: Vec<ChangeEvent> =
                        rows.iter().flat_map(|row| window.task_events(row)).collect();
                    (rows.len(), events)
                }),
                MonitoredTable::Availability => {
                    self.source.availability_since(since).await.map(|rows| {
                        let events: Vec<ChangeEvent> = rows
                            .iter()
                            .filter_map(|row| window.availability_event(row))
                            .collect();
                        (rows.len(), events)
                    })
                }
                MonitoredTable::DailyLogs => {
                    self.source.daily_logs_since(since).await.map(|rows| {
                        let events: Vec<ChangeEvent> = rows
                            .iter()
                            .filter_map(|row| window.daily_log_event(row))
                            .collect();
                        (rows.len(), events)
                    })
                }
            };

            let (rows, candidates): (usize, Vec<ChangeEvent>) = match fetched {
                Ok(fetched) => fetched,
                Err(e) => {
                    warn!(%table, "skipping table this cycle: {e}");
                    report.failures.push(e);
                    continue;
                }
            };

            let mut accepted = 0;
            for event in candidates {
                let key = (event.source_table, event.record_id.clone(), event.kind);
                if !emitted.insert(key) {
                    debug!(%table, record = %event.record_id, kind = %event.kind, "duplicate event suppressed");
                    continue;
                }
                self.queue.enqueue(OutboundMessage {
                    text: self.formatter.format(&event),
                    enqueued_at: self.clock.now(),
                });
                report.events.push(event);
                accepted += 1;
            }

            self.watermarks
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .advance(table, started_at);

            if rows > 0 {
                info!(%table, rows, events = accepted, "table polled");
            }
            report.tables.push(TableOutcome {
                table,
                rows,
                events: accepted,
            });
        }

        report
    }

    /// Poll on a fixed period until `cancel` fires. The cycle in progress
    /// when cancellation arrives runs to completion.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "polling every {}s (first cycle in {}s)",
            self.settings.interval.as_secs(),
            self.settings.initial_delay.as_secs()
        );

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(self.settings.initial_delay) => {}
        }

        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    debug!(
                        events = report.events.len(),
                        failures = report.failures.len(),
                        "poll cycle finished"
                    );
                }
            }
        }
        info!("poller stopped");
    }
}
