//! Rows read from the work-tracking store.
//!
//! The relay only ever reads these. Field names follow the store's column
//! names so rows deserialize straight from the REST response.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One of the three record classes the poller watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoredTable {
    Tasks,
    Availability,
    DailyLogs,
}

impl MonitoredTable {
    /// All monitored tables, in poll order.
    pub const ALL: [MonitoredTable; 3] = [
        MonitoredTable::Tasks,
        MonitoredTable::Availability,
        MonitoredTable::DailyLogs,
    ];

    /// Store table name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MonitoredTable::Tasks => "tasks",
            MonitoredTable::Availability => "availability",
            MonitoredTable::DailyLogs => "daily_logs",
        }
    }

    /// Column compared against the watermark and used for ascending order.
    #[must_use]
    pub fn mutation_column(self) -> &'static str {
        match self {
            MonitoredTable::Tasks | MonitoredTable::Availability => "updated_at",
            MonitoredTable::DailyLogs => "created_at",
        }
    }
}

impl fmt::Display for MonitoredTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskRow {
    #[serde(deserialize_with = "record_id")]
    pub id: String,
    pub title: String,
    pub assigned_member: String,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Declared availability status. Unknown values read as `Available`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    Leave,
    Exam,
    Busy,
    Sick,
    #[default]
    #[serde(other)]
    Available,
}

/// Availability / leave entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AvailabilityRow {
    #[serde(deserialize_with = "record_id")]
    pub id: String,
    pub member_name: String,
    #[serde(default)]
    pub status: AvailabilityStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default, deserialize_with = "non_empty_text")]
    pub reason: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Kind of a daily log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    CheckIn,
    CheckOut,
    #[serde(other)]
    Other,
}

/// Daily check-in / check-out log.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DailyLogRow {
    #[serde(deserialize_with = "record_id")]
    pub id: String,
    pub member_name: String,
    pub log_type: LogType,
    #[serde(default, deserialize_with = "text_list")]
    pub tasks_planned: Vec<String>,
    #[serde(default, deserialize_with = "text_list")]
    pub tasks_completed: Vec<String>,
    #[serde(default, deserialize_with = "non_empty_text")]
    pub tomorrow_priority: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Accepts string or numeric primary keys.
fn record_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn non_empty_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn text_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn task_row_accepts_numeric_id_and_null_completion() {
        let row: TaskRow = serde_json::from_value(json!({
            "id": 42,
            "title": "Ship release notes",
            "assigned_member": "ilan",
            "completed": false,
            "created_at": "2025-03-01T09:00:00+00:00",
            "completed_at": null,
            "updated_at": "2025-03-01T09:00:00.123456+00:00",
            "priority": "high"
        }))
        .unwrap();
        assert_eq!(row.id, "42");
        assert!(row.completed_at.is_none());
    }

    #[test]
    fn availability_unknown_status_is_available_and_blank_reason_dropped() {
        let row: AvailabilityRow = serde_json::from_value(json!({
            "id": "a1",
            "member_name": "hysam",
            "status": "wfh",
            "start_date": "2025-03-03",
            "end_date": "2025-03-04",
            "reason": "  ",
            "updated_at": "2025-03-01T09:00:00Z"
        }))
        .unwrap();
        assert_eq!(row.status, AvailabilityStatus::Available);
        assert!(row.reason.is_none());
        assert!(row.created_at.is_none());
    }

    #[test]
    fn daily_log_null_lists_become_empty() {
        let row: DailyLogRow = serde_json::from_value(json!({
            "id": "d1",
            "member_name": "alan",
            "log_type": "check_out",
            "tasks_planned": null,
            "tasks_completed": null,
            "created_at": "2025-03-01T17:30:00Z"
        }))
        .unwrap();
        assert_eq!(row.log_type, LogType::CheckOut);
        assert!(row.tasks_planned.is_empty());
        assert!(row.tasks_completed.is_empty());
        assert!(row.tomorrow_priority.is_none());
    }

    #[test]
    fn unknown_log_type_is_other() {
        let row: DailyLogRow = serde_json::from_value(json!({
            "id": 7,
            "member_name": "alan",
            "log_type": "lunch_break",
            "created_at": "2025-03-01T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(row.log_type, LogType::Other);
    }

    #[test]
    fn mutation_columns_match_store_schema() {
        assert_eq!(MonitoredTable::Tasks.mutation_column(), "updated_at");
        assert_eq!(MonitoredTable::Availability.mutation_column(), "updated_at");
        assert_eq!(MonitoredTable::DailyLogs.mutation_column(), "created_at");
        assert_eq!(MonitoredTable::DailyLogs.to_string(), "daily_logs");
    }
}
