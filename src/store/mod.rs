//! Read-only access to the work-tracking store.
//!
//! The poller only needs time-filtered, ascending reads of three tables.
//! Anything that can answer those (the REST client below, an in-memory
//! fixture in tests) implements [`RecordSource`].

mod rest;

pub use rest::{RestRecordSource, RestStoreConfig};

use crate::error::QueryError;
use crate::records::{AvailabilityRow, DailyLogRow, TaskRow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Time-filtered reads against the store.
///
/// Every method returns rows whose table mutation column is `>= since`,
/// ordered ascending by that column.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn tasks_since(&self, since: DateTime<Utc>) -> Result<Vec<TaskRow>, QueryError>;

    async fn availability_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<AvailabilityRow>, QueryError>;

    async fn daily_logs_since(&self, since: DateTime<Utc>)
    -> Result<Vec<DailyLogRow>, QueryError>;
}
