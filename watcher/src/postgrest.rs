//! PostgREST transport.
//!
//! Snapshots are plain `GET {base}/{table}` requests. PostgREST has no change
//! feed, so changes are detected from the `created_at`, `updated_at` and
//! `deleted_at` columns of every watched table.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rill_engine::{InitialQuery, PolledChange, TableName, Timestamp};
use serde_json::Value;

use crate::error::{Result, WatcherError};
use crate::source::{PollSource, SnapshotSource};

/// A change query against one table, and how to read its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeQuery {
    /// `INSERT`, `UPDATE` or `DELETE`
    pub kind: &'static str,
    /// Column holding the change time
    pub timestamp_column: &'static str,
    pub url: String,
}

/// HTTP client for a PostgREST API.
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    http: reqwest::Client,
    base_url: String,
}

impl PostgrestClient {
    /// Create a client for the API at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of the initial fetch for `table`.
    pub fn snapshot_url(&self, table: &str, query: &InitialQuery<String>) -> String {
        match query {
            InitialQuery::Default => format!("{}/{}", self.base_url, table),
            InitialQuery::Custom(query) => {
                format!("{}/{}?{}", self.base_url, table, query.trim_start_matches('?'))
            }
        }
    }

    /// The three change queries for `table` since `since`.
    pub fn change_queries(&self, table: &str, since: DateTime<Utc>) -> [ChangeQuery; 3] {
        let t = since.to_rfc3339_opts(SecondsFormat::Millis, true);
        let base = format!("{}/{}", self.base_url, table);
        [
            ChangeQuery {
                kind: "INSERT",
                timestamp_column: "created_at",
                url: format!("{base}?created_at=gte.{t}&deleted_at=is.null"),
            },
            ChangeQuery {
                kind: "UPDATE",
                timestamp_column: "updated_at",
                url: format!("{base}?created_at=lt.{t}&updated_at=gte.{t}&deleted_at=is.null"),
            },
            ChangeQuery {
                kind: "DELETE",
                timestamp_column: "deleted_at",
                url: format!("{base}?deleted_at=gte.{t}"),
            },
        ]
    }

    /// GET a JSON array of rows.
    async fn get_rows(&self, url: &str) -> Result<Vec<Value>> {
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WatcherError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        match response.json::<Value>().await? {
            Value::Array(rows) => Ok(rows),
            other => Err(WatcherError::Decode(format!(
                "expected an array of rows from {url}, got {}",
                kind_of(&other)
            ))),
        }
    }

    async fn table_changes(&self, table: &str, since: DateTime<Utc>) -> Result<Vec<PolledChange>> {
        let [inserts, updates, deletes] = self.change_queries(table, since);
        let (inserted, updated, deleted) = futures::try_join!(
            self.get_rows(&inserts.url),
            self.get_rows(&updates.url),
            self.get_rows(&deletes.url),
        )?;

        let fallback = since.timestamp_millis();
        let changes = [(inserts, inserted), (updates, updated), (deletes, deleted)]
            .into_iter()
            .flat_map(|(query, rows)| {
                rows.into_iter().map(move |record| PolledChange {
                    kind: query.kind.to_string(),
                    table: table.to_string(),
                    timestamp: row_timestamp(&record, query.timestamp_column).unwrap_or(fallback),
                    record,
                })
            })
            .collect();

        Ok(changes)
    }
}

#[async_trait]
impl SnapshotSource<String> for PostgrestClient {
    async fn fetch(&self, table: &str, query: &InitialQuery<String>) -> Result<Vec<Value>> {
        let url = self.snapshot_url(table, query);
        tracing::debug!(table = %table, url = %url, "Fetching snapshot");
        self.get_rows(&url).await
    }
}

#[async_trait]
impl PollSource for PostgrestClient {
    async fn poll_changes(
        &self,
        tables: &[TableName],
        since: DateTime<Utc>,
    ) -> Result<Vec<PolledChange>> {
        let mut changes = Vec::new();
        for table in tables {
            changes.extend(self.table_changes(table, since).await?);
        }
        Ok(changes)
    }
}

/// Milliseconds since epoch of an RFC 3339 column.
fn row_timestamp(record: &Value, column: &str) -> Option<Timestamp> {
    let raw = record.get(column)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.timestamp_millis())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
