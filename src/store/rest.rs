use crate::error::QueryError;
use crate::records::{AvailabilityRow, DailyLogRow, MonitoredTable, TaskRow};
use crate::store::RecordSource;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::warn;

/// Connection settings for the store's REST endpoint.
#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    /// Project base URL, e.g. `https://abc.supabase.co`.
    pub base_url: String,
    /// Anonymous (read) API key.
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// PostgREST-style client for the three monitored tables.
#[derive(Clone)]
pub struct RestRecordSource {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl RestRecordSource {
    /// Build a client. Fails only if the HTTP client cannot be constructed.
    pub fn new(config: &RestStoreConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn table_url(&self, table: MonitoredTable) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        table: MonitoredTable,
        since: DateTime<Utc>,
    ) -> Result<Vec<T>, QueryError> {
        let column = table.mutation_column();
        let since = since.to_rfc3339_opts(SecondsFormat::Millis, true);
        let query = [
            ("select", "*".to_owned()),
            (column, format!("gte.{since}")),
            ("order", format!("{column}.asc")),
        ];

        let response = self
            .client
            .get(self.table_url(table))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
            .query(&query)
            .send()
            .await
            .map_err(|e| QueryError::new(table, format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(QueryError::new(table, format!("store returned {status}: {body}")));
        }

        let raw = response
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| QueryError::new(table, format!("cannot decode rows: {e}")))?;
        Ok(decode_rows(table, raw))
    }
}

/// Decode each row on its own. A row that does not match the expected shape
/// is logged and skipped so it cannot hold back the rest of its table.
fn decode_rows<T: DeserializeOwned>(table: MonitoredTable, raw: Vec<serde_json::Value>) -> Vec<T> {
    raw.into_iter()
        .filter_map(|value| {
            let id = value.get("id").map(ToString::to_string);
            match serde_json::from_value(value) {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!(%table, id = id.as_deref().unwrap_or("?"), "skipping malformed row: {e}");
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl RecordSource for RestRecordSource {
    async fn tasks_since(&self, since: DateTime<Utc>) -> Result<Vec<TaskRow>, QueryError> {
        self.fetch(MonitoredTable::Tasks, since).await
    }

    async fn availability_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<AvailabilityRow>, QueryError> {
        self.fetch(MonitoredTable::Availability, since).await
    }

    async fn daily_logs_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyLogRow>, QueryError> {
        self.fetch(MonitoredTable::DailyLogs, since).await
    }
}
