//! Renders change events as chat text.

use crate::events::{ChangeEvent, ChangeKind, ChangePayload};
use crate::records::AvailabilityStatus;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Built-in display names keyed by member identifier.
const DEFAULT_DISPLAY_NAMES: [(&str, &str); 4] = [
    ("ilan", "Ilan"),
    ("midlaj", "Midlaj"),
    ("hysam", "Hysam"),
    ("alan", "Alan"),
];

/// Maps member identifiers to display names.
#[derive(Debug, Clone)]
pub struct MemberDirectory {
    names: HashMap<String, String>,
}

impl Default for MemberDirectory {
    fn default() -> Self {
        Self {
            names: DEFAULT_DISPLAY_NAMES
                .iter()
                .map(|(id, name)| ((*id).to_owned(), (*name).to_owned()))
                .collect(),
        }
    }
}

impl MemberDirectory {
    /// Built-in names with `overrides` layered on top.
    #[must_use]
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut directory = Self::default();
        for (id, name) in overrides {
            directory.names.insert(id.clone(), name.clone());
        }
        directory
    }

    /// Display name for `member`, or the raw identifier when unknown.
    #[must_use]
    pub fn display_name<'a>(&'a self, member: &'a str) -> &'a str {
        self.names.get(member).map_or(member, String::as_str)
    }
}

/// Pure event-to-text mapping.
#[derive(Debug, Clone, Default)]
pub struct MessageFormatter {
    members: MemberDirectory,
}

impl MessageFormatter {
    #[must_use]
    pub fn new(members: MemberDirectory) -> Self {
        Self { members }
    }

    #[must_use]
    pub fn format(&self, event: &ChangeEvent) -> String {
        let name = self.members.display_name(&event.subject_member);
        match &event.payload {
            ChangePayload::Task { title } => {
                if event.kind == ChangeKind::TaskCompleted {
                    format!("✅ {name} completed task: {title}")
                } else {
                    format!("📋 {name} added task: {title}")
                }
            }
            ChangePayload::Availability {
                status,
                start_date,
                end_date,
                reason,
            } => {
                let (icon, label) = status_badge(*status);
                let mut message = format!("{icon} {name} is {label}");
                if start_date == end_date {
                    message.push_str(" today");
                } else {
                    message.push_str(&format!(
                        " from {} to {}",
                        short_date(*start_date),
                        short_date(*end_date)
                    ));
                }
                if let Some(reason) = reason {
                    message.push_str(&format!(" ({reason})"));
                }
                message
            }
            ChangePayload::CheckIn { tasks_planned } => {
                let mut message = format!("🌅 {name} started the day");
                if !tasks_planned.is_empty() {
                    message.push_str(&format!("\nPlanned tasks: {}", tasks_planned.join(", ")));
                }
                message
            }
            ChangePayload::CheckOut {
                tasks_completed,
                tomorrow_priority,
            } => {
                let mut message = format!("🌙 {name} finished the day");
                if tasks_completed.is_empty() {
                    message.push_str("\nCompleted: No tasks finished today");
                } else {
                    message.push_str(&format!("\nCompleted: {}", tasks_completed.join(", ")));
                }
                if let Some(priority) = tomorrow_priority {
                    message.push_str(&format!("\nTomorrow's focus: {priority}"));
                }
                message
            }
        }
    }
}

fn status_badge(status: AvailabilityStatus) -> (&'static str, &'static str) {
    match status {
        AvailabilityStatus::Leave => ("🏖️", "on leave"),
        AvailabilityStatus::Exam => ("📚", "taking exams"),
        AvailabilityStatus::Busy => ("⚡", "busy"),
        AvailabilityStatus::Sick => ("🤒", "sick"),
        AvailabilityStatus::Available => ("✅", "available"),
    }
}

/// `M/D/YYYY`
fn short_date(date: NaiveDate) -> String {
    date.format("%-m/%-d/%Y").to_string()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::records::MonitoredTable;
    use chrono::{TimeZone, Utc};

    fn event(member: &str, kind: ChangeKind, payload: ChangePayload) -> ChangeEvent {
        ChangeEvent {
            source_table: MonitoredTable::Tasks,
            record_id: "r1".to_owned(),
            subject_member: member.to_owned(),
            kind,
            occurred_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            payload,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn renders_every_kind() {
        let cases = vec![
            (
                event(
                    "ilan",
                    ChangeKind::TaskAdded,
                    ChangePayload::Task {
                        title: "Fix login".to_owned(),
                    },
                ),
                "📋 Ilan added task: Fix login",
            ),
            (
                event(
                    "midlaj",
                    ChangeKind::TaskCompleted,
                    ChangePayload::Task {
                        title: "Fix login".to_owned(),
                    },
                ),
                "✅ Midlaj completed task: Fix login",
            ),
            (
                event(
                    "hysam",
                    ChangeKind::AvailabilityChanged,
                    ChangePayload::Availability {
                        status: AvailabilityStatus::Leave,
                        start_date: date(2025, 3, 3),
                        end_date: date(2025, 3, 7),
                        reason: Some("family trip".to_owned()),
                    },
                ),
                "🏖️ Hysam is on leave from 3/3/2025 to 3/7/2025 (family trip)",
            ),
            (
                event(
                    "alan",
                    ChangeKind::AvailabilityChanged,
                    ChangePayload::Availability {
                        status: AvailabilityStatus::Sick,
                        start_date: date(2025, 3, 3),
                        end_date: date(2025, 3, 3),
                        reason: None,
                    },
                ),
                "🤒 Alan is sick today",
            ),
            (
                event(
                    "alan",
                    ChangeKind::CheckedIn,
                    ChangePayload::CheckIn {
                        tasks_planned: vec!["Review PR".to_owned(), "Deploy".to_owned()],
                    },
                ),
                "🌅 Alan started the day\nPlanned tasks: Review PR, Deploy",
            ),
            (
                event(
                    "alan",
                    ChangeKind::CheckedIn,
                    ChangePayload::CheckIn {
                        tasks_planned: Vec::new(),
                    },
                ),
                "🌅 Alan started the day",
            ),
            (
                event(
                    "ilan",
                    ChangeKind::CheckedOut,
                    ChangePayload::CheckOut {
                        tasks_completed: vec!["Review PR".to_owned()],
                        tomorrow_priority: Some("Deploy".to_owned()),
                    },
                ),
                "🌙 Ilan finished the day\nCompleted: Review PR\nTomorrow's focus: Deploy",
            ),
            (
                event(
                    "ilan",
                    ChangeKind::CheckedOut,
                    ChangePayload::CheckOut {
                        tasks_completed: Vec::new(),
                        tomorrow_priority: None,
                    },
                ),
                "🌙 Ilan finished the day\nCompleted: No tasks finished today",
            ),
        ];

        let formatter = MessageFormatter::default();
        for (event, expected) in cases {
            assert_eq!(formatter.format(&event), expected, "kind {}", event.kind);
        }
    }

    #[test]
    fn availability_without_reason_has_no_parenthetical() {
        let formatter = MessageFormatter::default();
        let text = formatter.format(&event(
            "midlaj",
            ChangeKind::AvailabilityChanged,
            ChangePayload::Availability {
                status: AvailabilityStatus::Exam,
                start_date: date(2025, 3, 3),
                end_date: date(2025, 3, 4),
                reason: None,
            },
        ));
        assert_eq!(text, "📚 Midlaj is taking exams from 3/3/2025 to 3/4/2025");
        assert!(!text.contains('('));
    }

    #[test]
    fn status_badges() {
        assert_eq!(status_badge(AvailabilityStatus::Busy), ("⚡", "busy"));
        assert_eq!(
            status_badge(AvailabilityStatus::Available),
            ("✅", "available")
        );
    }

    #[test]
    fn unknown_member_falls_back_to_identifier() {
        let directory = MemberDirectory::default();
        assert_eq!(directory.display_name("ilan"), "Ilan");
        assert_eq!(directory.display_name("zoe"), "zoe");
    }

    #[test]
    fn overrides_replace_and_extend_names() {
        let overrides = HashMap::from([
            ("ilan".to_owned(), "Ilan K.".to_owned()),
            ("zoe".to_owned(), "Zoe".to_owned()),
        ]);
        let directory = MemberDirectory::with_overrides(&overrides);
        assert_eq!(directory.display_name("ilan"), "Ilan K.");
        assert_eq!(directory.display_name("zoe"), "Zoe");
        assert_eq!(directory.display_name("alan"), "Alan");
    }
}
