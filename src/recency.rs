//! Recency window filter.
//!
//! Decides whether a row mutation is new enough to report. The window is
//! sized to the poll interval: a mutation is reported when it happened less
//! than one interval before the cycle's "now". After an outage longer than
//! the interval, mutations from the outage fall outside the window and are
//! suppressed instead of replayed.
//!
//! Task newness compares `created_at` with "now", not with the table
//! watermark. A task whose row is first observed after the window has moved
//! past its `created_at` is treated as stale, and one created right at a
//! window edge can be reported by two consecutive cycles.

use crate::events::{ChangeEvent, ChangeKind, ChangePayload};
use crate::records::{AvailabilityRow, DailyLogRow, LogType, MonitoredTable, TaskRow};
use chrono::{DateTime, Duration, Utc};

/// Recency window anchored at a cycle's start time.
#[derive(Debug, Clone, Copy)]
pub struct RecencyWindow {
    now: DateTime<Utc>,
    interval: Duration,
}

impl RecencyWindow {
    #[must_use]
    pub fn new(now: DateTime<Utc>, interval: Duration) -> Self {
        Self { now, interval }
    }

    /// `true` when `(now - at) < interval`.
    ///
    /// Timestamps slightly in the future (store clock ahead of ours) count
    /// as recent.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.now.signed_duration_since(at) < self.interval
    }

    /// Candidate events for a task row. At most one `TaskAdded` and one
    /// `TaskCompleted`, always in that order.
    #[must_use]
    pub fn task_events(&self, row: &TaskRow) -> Vec<ChangeEvent> {
        let mut events = Vec::with_capacity(2);

        if !row.completed && self.contains(row.created_at) {
            events.push(task_event(row, ChangeKind::TaskAdded, row.created_at));
        }

        if let Some(completed_at) = row.completed_at {
            if self.contains(completed_at) {
                events.push(task_event(row, ChangeKind::TaskCompleted, completed_at));
            }
        }

        events
    }

    #[must_use]
    pub fn availability_event(&self, row: &AvailabilityRow) -> Option<ChangeEvent> {
        if !self.contains(row.updated_at) {
            return None;
        }
        Some(ChangeEvent {
            source_table: MonitoredTable::Availability,
            record_id: row.id.clone(),
            subject_member: row.member_name.clone(),
            kind: ChangeKind::AvailabilityChanged,
            occurred_at: row.updated_at,
            payload: ChangePayload::Availability {
                status: row.status,
                start_date: row.start_date,
                end_date: row.end_date,
                reason: row.reason.clone(),
            },
        })
    }

    #[must_use]
    pub fn daily_log_event(&self, row: &DailyLogRow) -> Option<ChangeEvent> {
        if !self.contains(row.created_at) {
            return None;
        }
        let (kind, payload) = match row.log_type {
            LogType::CheckIn => (
                ChangeKind::CheckedIn,
                ChangePayload::CheckIn {
                    tasks_planned: row.tasks_planned.clone(),
                },
            ),
            LogType::CheckOut => (
                ChangeKind::CheckedOut,
                ChangePayload::CheckOut {
                    tasks_completed: row.tasks_completed.clone(),
                    tomorrow_priority: row.tomorrow_priority.clone(),
                },
            ),
            LogType::Other => return None,
        };
        Some(ChangeEvent {
            source_table: MonitoredTable::DailyLogs,
            record_id: row.id.clone(),
            subject_member: row.member_name.clone(),
            kind,
            occurred_at: row.created_at,
            payload,
        })
    }
}

fn task_event(row: &TaskRow, kind: ChangeKind, occurred_at: DateTime<Utc>) -> ChangeEvent {
    ChangeEvent {
        source_table: MonitoredTable::Tasks,
        record_id: row.id.clone(),
        subject_member: row.assigned_member.clone(),
        kind,
        occurred_at,
        payload: ChangePayload::Task {
            title: row.title.clone(),
        },
    }
}
