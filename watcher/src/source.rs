//! Transport seams.
//!
//! A [`SnapshotSource`] answers the initial fetch of each view; a
//! [`PollSource`] reports changes for backends without push notifications.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rill_engine::{InitialQuery, PolledChange, TableName};
use serde_json::Value;

use crate::error::Result;

/// Fetches the rows a view is seeded with.
#[async_trait]
pub trait SnapshotSource<Q: Send + Sync>: Send + Sync {
    /// Fetch the rows of `table`, using `query` when the view declared one.
    async fn fetch(&self, table: &str, query: &InitialQuery<Q>) -> Result<Vec<Value>>;
}

/// Reports changes made to tables since a checkpoint.
#[async_trait]
pub trait PollSource: Send + Sync {
    /// Changes to any of `tables` made at or after `since`, in any order.
    async fn poll_changes(
        &self,
        tables: &[TableName],
        since: DateTime<Utc>,
    ) -> Result<Vec<PolledChange>>;
}
