//! Poll loop for backends without push notifications.
//!
//! Each cycle asks a [`PollSource`] for the changes made since the last
//! checkpoint and forwards them, oldest first, to the watcher. The checkpoint
//! only advances after a successful cycle, so a failed cycle is retried from
//! the same point.
//!
//! The first checkpoint is supplied by the caller. It must be taken before
//! the snapshots are fetched, otherwise a change landing between a fetch and
//! the first cycle is never seen.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rill_engine::{PolledChange, TableName};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::source::PollSource;

/// Timing of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Pause after a successful cycle
    pub interval: Duration,
    /// Pause after a failed cycle
    pub retry_delay: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Poll `tables` for changes made at or after `since` until `cancel` fires
/// or the receiver of `tx` is dropped.
pub async fn poll_loop<S>(
    source: Arc<S>,
    tables: Vec<TableName>,
    settings: PollSettings,
    since: DateTime<Utc>,
    tx: mpsc::Sender<PolledChange>,
    cancel: CancellationToken,
) where
    S: PollSource + ?Sized,
{
    let mut checkpoint = since;
    tracing::info!(tables = ?tables, since = %since, "Poll loop started");

    loop {
        let cycle_start = Utc::now();

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = source.poll_changes(&tables, checkpoint) => result,
        };

        let delay = match result {
            Ok(mut changes) => {
                changes.sort_by_key(|change| change.timestamp);
                let count = changes.len();

                for change in changes {
                    if tx.send(change).await.is_err() {
                        tracing::debug!("Change receiver dropped, stopping poll loop");
                        return;
                    }
                }

                if count > 0 {
                    tracing::debug!(changes = count, since = %checkpoint, "Poll cycle delivered changes");
                }
                checkpoint = cycle_start;
                settings.interval
            }
            Err(e) => {
                tracing::warn!(error = %e, since = %checkpoint, "Poll cycle failed, retrying");
                settings.retry_delay
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::info!("Poll loop stopped");
}

/// Spawn [`poll_loop`] on the tokio runtime.
pub fn spawn<S>(
    source: Arc<S>,
    tables: Vec<TableName>,
    settings: PollSettings,
    since: DateTime<Utc>,
    tx: mpsc::Sender<PolledChange>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    S: PollSource + ?Sized + 'static,
{
    tokio::spawn(poll_loop(source, tables, settings, since, tx, cancel))
}
