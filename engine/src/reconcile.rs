//! Reconciliation of change events into views.
//!
//! This is the core of the engine. Given a normalized change event, every
//! view routed from the event's table is updated so that it keeps holding
//! exactly the records of that table which satisfy the view's filter.
//!
//! # Algorithm
//!
//! For each view `v` fed by `event.table`, with `admits = filter[v](new_record)`:
//!
//! | Kind            | id present in `v` | admits | Result            |
//! |-----------------|-------------------|--------|-------------------|
//! | Insert / Update | yes               | yes    | replace in place  |
//! | Insert / Update | yes               | no     | remove            |
//! | Insert / Update | no                | yes    | append            |
//! | Insert / Update | no                | no     | nothing           |
//! | Delete          | yes               | -      | remove            |
//! | Delete          | no                | -      | nothing           |
//!
//! An Insert for an id the view already holds is treated as an Update, so a
//! duplicated delivery never yields two records with the same id. A record
//! soft-deleted under the [`SeedOptions`] never admits.
//!
//! Views are processed independently: a failure in one view is reported and
//! the remaining views still receive the event.

use crate::{
    error::Result,
    snapshot::{self, SeedOptions, SeedReport},
    ChangeEvent, ChangeKind, Collection, Error, FilterRegistry, RoutingMap, Store, ViewName,
};
use serde::Serialize;
use serde_json::Value;

/// What an event did to one view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ViewMutation {
    /// The record was appended at the end
    Appended,
    /// The record at `index` was replaced
    Replaced { index: usize },
    /// The record at `index` was removed
    Removed { index: usize },
    /// The view is still loading; the event waits in its backlog
    Buffered,
    /// Nothing to do for this view
    Unchanged,
}

impl ViewMutation {
    /// Whether the view's visible contents changed.
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            ViewMutation::Appended | ViewMutation::Replaced { .. } | ViewMutation::Removed { .. }
        )
    }
}

/// Outcome of an event for one view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewOutcome {
    pub view: ViewName,
    pub mutation: ViewMutation,
}

/// A view that could not process an event.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewFailure {
    pub view: ViewName,
    pub error: Error,
}

/// Result of applying one change event.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyReport {
    /// The event's kind
    pub kind: ChangeKind,
    /// The event's table
    pub table: String,
    /// Per-view outcomes, in routing order
    pub outcomes: Vec<ViewOutcome>,
    /// Views that failed, in routing order
    pub failures: Vec<ViewFailure>,
}

impl ApplyReport {
    fn new(event: &ChangeEvent) -> Self {
        Self {
            kind: event.kind,
            table: event.table.clone(),
            outcomes: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn record(&mut self, view: &str, result: Result<ViewMutation>) {
        match result {
            Ok(mutation) => self.outcomes.push(ViewOutcome {
                view: view.to_string(),
                mutation,
            }),
            Err(error) => self.failures.push(ViewFailure {
                view: view.to_string(),
                error,
            }),
        }
    }

    /// Whether any view's visible contents changed.
    pub fn changed(&self) -> bool {
        self.outcomes.iter().any(|o| o.mutation.is_change())
    }

    /// Views whose visible contents changed.
    pub fn changed_views(&self) -> impl Iterator<Item = &ViewName> {
        self.outcomes
            .iter()
            .filter(|o| o.mutation.is_change())
            .map(|o| &o.view)
    }

    /// The outcome for a given view.
    pub fn outcome(&self, view: &str) -> Option<ViewMutation> {
        self.outcomes
            .iter()
            .find(|o| o.view == view)
            .map(|o| o.mutation)
    }
}

/// Apply a change event to every view routed from its table.
pub fn apply_change(
    event: &ChangeEvent,
    routing: &RoutingMap,
    filters: &FilterRegistry,
    options: &SeedOptions,
    store: &mut Store,
) -> ApplyReport {
    let mut report = ApplyReport::new(event);

    for view in routing.views_for(&event.table) {
        let result = apply_to_slot(view, event, filters, options, store);
        report.record(view, result);
    }

    report
}

/// Buffer the event if the view is still loading, otherwise reconcile it.
fn apply_to_slot(
    view: &str,
    event: &ChangeEvent,
    filters: &FilterRegistry,
    options: &SeedOptions,
    store: &mut Store,
) -> Result<ViewMutation> {
    let slot = store.slot_mut(view)?;
    if slot.buffer(event) {
        Ok(ViewMutation::Buffered)
    } else {
        reconcile_view(view, event, filters, options, slot.records_mut())
    }
}

/// Apply one event to one view's records.
///
/// A record soft-deleted under `options` is treated as failing the filter.
fn reconcile_view(
    view: &str,
    event: &ChangeEvent,
    filters: &FilterRegistry,
    options: &SeedOptions,
    records: &mut Collection,
) -> Result<ViewMutation> {
    match event.kind {
        ChangeKind::Insert | ChangeKind::Update => {
            let record = event
                .new_record
                .as_ref()
                .ok_or(Error::MissingField("new record"))?;
            let id = event.new_id.as_ref().unwrap_or_else(|| record.id());
            let soft_deleted = options
                .soft_delete_field
                .as_deref()
                .is_some_and(|field| record.is_soft_deleted(field));
            let admitted = !soft_deleted && filters.admits(view, record)?;

            let mutation = match (records.position(id), admitted) {
                (Some(index), true) => {
                    records.replace_at(index, record.clone());
                    ViewMutation::Replaced { index }
                }
                (Some(index), false) => {
                    records.remove_at(index);
                    ViewMutation::Removed { index }
                }
                (None, true) => {
                    records.append(record.clone());
                    ViewMutation::Appended
                }
                (None, false) => ViewMutation::Unchanged,
            };
            Ok(mutation)
        }
        ChangeKind::Delete => {
            let id = event.old_id.as_ref().ok_or(Error::MissingField("old id"))?;
            Ok(match records.position(id) {
                Some(index) => {
                    records.remove_at(index);
                    ViewMutation::Removed { index }
                }
                None => ViewMutation::Unchanged,
            })
        }
    }
}

/// Routing, filters and seeding options of one set of view declarations.
///
/// Each watcher owns its own reconciler; nothing here is shared between
/// independent sets of views.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    routing: RoutingMap,
    filters: FilterRegistry,
    seed_options: SeedOptions,
}

impl Reconciler {
    /// Create a reconciler from a routing map and filter registry.
    pub fn new(routing: RoutingMap, filters: FilterRegistry) -> Self {
        Self {
            routing,
            filters,
            seed_options: SeedOptions::default(),
        }
    }

    /// Set the options used when seeding snapshots.
    pub fn with_seed_options(mut self, options: SeedOptions) -> Self {
        self.seed_options = options;
        self
    }

    /// The routing map.
    pub fn routing(&self) -> &RoutingMap {
        &self.routing
    }

    /// The filter registry.
    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// The seeding options.
    pub fn seed_options(&self) -> &SeedOptions {
        &self.seed_options
    }

    /// Apply a change event to every routed view.
    pub fn apply_change(&self, event: &ChangeEvent, store: &mut Store) -> ApplyReport {
        apply_change(
            event,
            &self.routing,
            &self.filters,
            &self.seed_options,
            store,
        )
    }

    /// Apply a change event to `view` only.
    ///
    /// For transports that attach one listener per view (Firestore): a
    /// listener's changes must not reach sibling views over the same table.
    /// The event's table must be the view's source table.
    pub fn apply_to_view(
        &self,
        view: &str,
        event: &ChangeEvent,
        store: &mut Store,
    ) -> ApplyReport {
        let mut report = ApplyReport::new(event);

        let result = match self.routing.table_for(view) {
            None => Err(Error::UnknownView(view.to_string())),
            Some(table) if *table != event.table => Err(Error::TableMismatch {
                view: view.to_string(),
                expected: table.clone(),
                found: event.table.clone(),
            }),
            Some(_) => apply_to_slot(view, event, &self.filters, &self.seed_options, store),
        };
        report.record(view, result);

        report
    }

    /// Install the snapshot of `view` and replay the events that raced it.
    ///
    /// The view must have been declared in `store`.
    pub fn seed(&self, store: &mut Store, view: &str, rows: Vec<Value>) -> Result<SeedReport> {
        let slot = store.slot_mut(view)?;
        let (collection, mut report) =
            snapshot::prepare(view, rows, &self.filters, &self.seed_options);

        let backlog = slot.install(collection);
        for event in &backlog {
            match reconcile_view(
                view,
                event,
                &self.filters,
                &self.seed_options,
                slot.records_mut(),
            ) {
                Ok(_) => report.replayed += 1,
                Err(e) => report.replay_errors.push(e.to_string()),
            }
        }

        Ok(report)
    }
}
