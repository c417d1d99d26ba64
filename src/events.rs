//! Change events and outbound messages.

use crate::records::{AvailabilityStatus, MonitoredTable};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;

/// What happened to a monitored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    TaskAdded,
    TaskCompleted,
    AvailabilityChanged,
    CheckedIn,
    CheckedOut,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::TaskAdded => "task_added",
            ChangeKind::TaskCompleted => "task_completed",
            ChangeKind::AvailabilityChanged => "availability_changed",
            ChangeKind::CheckedIn => "checked_in",
            ChangeKind::CheckedOut => "checked_out",
        };
        f.write_str(name)
    }
}

/// Kind-specific details carried into the formatter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangePayload {
    Task {
        title: String,
    },
    Availability {
        status: AvailabilityStatus,
        start_date: NaiveDate,
        end_date: NaiveDate,
        reason: Option<String>,
    },
    CheckIn {
        tasks_planned: Vec<String>,
    },
    CheckOut {
        tasks_completed: Vec<String>,
        tomorrow_priority: Option<String>,
    },
}

/// A detected, reportable mutation of a monitored record.
///
/// Built per poll cycle and discarded after a single dispatch attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub source_table: MonitoredTable,
    pub record_id: String,
    pub subject_member: String,
    pub kind: ChangeKind,
    pub occurred_at: DateTime<Utc>,
    pub payload: ChangePayload,
}

/// Rendered text waiting in the dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub enqueued_at: DateTime<Utc>,
}
