//! Snapshot seeding.
//!
//! Before live events flow, each view is seeded from an initial fetch of its
//! source table. This module turns the raw rows of such a fetch into the
//! collection that gets installed in the view's slot.

use crate::{Collection, FilterRegistry, Record, ViewName};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Options applied to every snapshot and every live change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedOptions {
    /// Rows with a non-null value in this column are soft-deleted: never
    /// seeded, and removed from a view when an update sets it
    pub soft_delete_field: Option<String>,
}

impl SeedOptions {
    /// Exclude rows whose `field` is set.
    pub fn with_soft_delete_field(mut self, field: impl Into<String>) -> Self {
        self.soft_delete_field = Some(field.into());
        self
    }
}

/// What happened while seeding one view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    /// The seeded view
    pub view: ViewName,
    /// Records installed from the snapshot
    pub loaded: usize,
    /// Rows that were not valid records
    pub invalid: usize,
    /// Rows excluded as soft-deleted
    pub soft_deleted: usize,
    /// Rows rejected by the view filter
    pub filtered_out: usize,
    /// Rows whose filter could not be evaluated
    pub filter_errors: usize,
    /// Rows repeating an id already seeded
    pub duplicates: usize,
    /// Buffered live events replayed after install
    pub replayed: usize,
    /// Buffered live events that failed to replay
    pub replay_errors: Vec<String>,
}

impl SeedReport {
    pub(crate) fn new(view: impl Into<ViewName>) -> Self {
        Self {
            view: view.into(),
            ..Self::default()
        }
    }

    /// Rows of the snapshot that did not make it into the view.
    pub fn skipped(&self) -> usize {
        self.invalid + self.soft_deleted + self.filtered_out + self.filter_errors + self.duplicates
    }
}

/// Build the seed collection of `view` from fetched rows.
///
/// Invalid rows, soft-deleted rows, rows the filter rejects and repeated ids
/// are dropped and counted in the report.
pub fn prepare(
    view: &str,
    rows: Vec<Value>,
    filters: &FilterRegistry,
    options: &SeedOptions,
) -> (Collection, SeedReport) {
    let mut report = SeedReport::new(view);
    let mut collection = Collection::new();

    for row in rows {
        let Ok(record) = Record::new(row) else {
            report.invalid += 1;
            continue;
        };

        if let Some(field) = &options.soft_delete_field {
            if record.is_soft_deleted(field) {
                report.soft_deleted += 1;
                continue;
            }
        }

        match filters.admits(view, &record) {
            Ok(true) => {}
            Ok(false) => {
                report.filtered_out += 1;
                continue;
            }
            Err(_) => {
                report.filter_errors += 1;
                continue;
            }
        }

        if collection.position(record.id()).is_some() {
            report.duplicates += 1;
            continue;
        }

        collection.append(record);
    }

    report.loaded = collection.len();
    (collection, report)
}
