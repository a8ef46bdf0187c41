//! The watcher: a store of live views kept in sync with one backend.
//!
//! A [`Watcher`] owns the reconciler and store of one set of view
//! declarations. Every view slot exists from construction on; snapshots are
//! loaded with [`Watcher::load_snapshots`], live changes enter through
//! [`Watcher::ingest`] or [`Watcher::run`], and consumers read views through a
//! [`StoreReader`] and follow changes with [`Watcher::subscribe`].
//! [`Watcher::watch_polled`] wires a polling backend up end to end.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use rill_engine::{
    normalize, ApplyReport, ChangeEvent, ChangeKind, PayloadSettings, PolledChange, Record,
    Reconciler, ResolvedViews, SeedOptions, SeedReport, Store, TableName, ViewName, ViewPlan,
    ViewSpec,
};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::poller::{self, PollSettings};
use crate::source::{PollSource, SnapshotSource};

/// Notification sent to subscribers after the store changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreUpdate {
    /// A view received its snapshot
    Seeded { view: ViewName, records: usize },
    /// A change event altered the contents of `views`
    Changed {
        table: TableName,
        kind: ChangeKind,
        views: Vec<ViewName>,
    },
}

/// Options of a [`Watcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherOptions {
    /// Applied to every snapshot
    pub seed: SeedOptions,
    /// Capacity of the update broadcast channel and of the polled change queue
    pub update_channel_capacity: usize,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            seed: SeedOptions::default(),
            update_channel_capacity: 256,
        }
    }
}

/// Read access to the views of a [`Watcher`].
///
/// Cheap to clone and can be shared across tasks.
#[derive(Debug, Clone)]
pub struct StoreReader {
    store: Arc<RwLock<Store>>,
}

impl StoreReader {
    /// A copy of the records of `view`, or `None` if it was never declared.
    pub fn get(&self, view: &str) -> Option<Vec<Record>> {
        self.store
            .read()
            .get(view)
            .map(|records| records.iter().cloned().collect())
    }

    /// Number of records in `view`.
    pub fn len(&self, view: &str) -> Option<usize> {
        self.store.read().len(view)
    }

    /// Whether `view` has received its snapshot.
    pub fn is_ready(&self, view: &str) -> bool {
        self.store.read().is_ready(view)
    }

    /// Whether every view has received its snapshot.
    pub fn all_ready(&self) -> bool {
        self.store.read().all_ready()
    }

    /// Declared view names, in declaration order.
    pub fn views(&self) -> Vec<ViewName> {
        self.store.read().views().cloned().collect()
    }
}

/// Live views over one backend.
pub struct Watcher<Q> {
    reconciler: Reconciler,
    plans: Vec<ViewPlan<Q>>,
    tables: Vec<TableName>,
    store: Arc<RwLock<Store>>,
    updates: broadcast::Sender<StoreUpdate>,
    channel_capacity: usize,
}

impl<Q> Watcher<Q> {
    /// Create a watcher for resolved views.
    ///
    /// Every view slot is created here, empty and loading, before any
    /// snapshot is fetched.
    pub fn new(resolved: ResolvedViews<Q>, options: WatcherOptions) -> Self {
        let reconciler = resolved.reconciler().with_seed_options(options.seed);

        let mut store = Store::new();
        for plan in &resolved.views {
            store.declare(plan.name.clone());
        }

        let channel_capacity = options.update_channel_capacity.max(1);
        let (updates, _) = broadcast::channel(channel_capacity);
        let tables = resolved.tables();

        tracing::info!(views = resolved.views.len(), tables = tables.len(), "Watcher created");

        Self {
            reconciler,
            plans: resolved.views,
            tables,
            store: Arc::new(RwLock::new(store)),
            updates,
            channel_capacity,
        }
    }

    /// Resolve `specs` and create a watcher for them.
    ///
    /// Fails without creating anything if the declarations are invalid.
    pub fn from_specs(
        specs: impl IntoIterator<Item = ViewSpec<Q>>,
        options: WatcherOptions,
    ) -> Result<Self> {
        let resolved = rill_engine::resolve(specs)?;
        Ok(Self::new(resolved, options))
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Views in declaration order.
    pub fn plans(&self) -> &[ViewPlan<Q>] {
        &self.plans
    }

    /// Distinct source tables, in first-declaration order.
    pub fn tables(&self) -> &[TableName] {
        &self.tables
    }

    /// A reader sharing this watcher's store.
    pub fn reader(&self) -> StoreReader {
        StoreReader {
            store: Arc::clone(&self.store),
        }
    }

    /// Subscribe to store updates.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreUpdate> {
        self.updates.subscribe()
    }

    /// Fetch and seed every view, in declaration order.
    ///
    /// A failed fetch is logged and seeds its view with no records.
    pub async fn load_snapshots<S>(&self, source: &S) -> Vec<SeedReport>
    where
        S: SnapshotSource<Q> + ?Sized,
        Q: Send + Sync,
    {
        let mut reports = Vec::with_capacity(self.plans.len());

        for plan in &self.plans {
            let rows = match source.fetch(&plan.table, &plan.query).await {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::warn!(view = %plan.name, table = %plan.table, error = %e, "Snapshot fetch failed, seeding empty view");
                    Vec::new()
                }
            };

            // the view size is read under the seeding lock: replayed deletes shrink it
            let seeded = {
                let mut store = self.store.write();
                self.reconciler
                    .seed(&mut store, &plan.name, rows)
                    .map(|report| (report, store.len(&plan.name).unwrap_or(0)))
            };
            match seeded {
                Ok((report, records)) => {
                    tracing::info!(
                        view = %plan.name,
                        loaded = report.loaded,
                        skipped = report.skipped(),
                        replayed = report.replayed,
                        "View seeded"
                    );
                    for error in &report.replay_errors {
                        tracing::warn!(view = %plan.name, error = %error, "Buffered change could not be replayed");
                    }
                    self.notify(StoreUpdate::Seeded {
                        view: plan.name.clone(),
                        records,
                    });
                    reports.push(report);
                }
                Err(e) => {
                    tracing::error!(view = %plan.name, error = %e, "Seeding failed");
                }
            }
        }

        reports
    }

    /// Normalize a backend payload and apply it.
    ///
    /// A payload that cannot be normalized is logged and dropped.
    pub fn ingest<P: 'static>(
        &self,
        settings: &PayloadSettings<P>,
        payload: &P,
    ) -> Option<ApplyReport> {
        match settings.normalize(payload) {
            Ok(event) => Some(self.apply(&event)),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping change that could not be normalized");
                None
            }
        }
    }

    /// Normalize a payload from a listener attached to one view and apply it
    /// to that view only.
    ///
    /// Firestore listeners work this way: see [`normalize::firestore`].
    pub fn ingest_into<P: 'static>(
        &self,
        view: &str,
        settings: &PayloadSettings<P>,
        payload: &P,
    ) -> Option<ApplyReport> {
        match settings.normalize(payload) {
            Ok(event) => {
                let report = self
                    .reconciler
                    .apply_to_view(view, &event, &mut self.store.write());
                Some(self.publish(&event, report))
            }
            Err(e) => {
                tracing::warn!(view = %view, error = %e, "Dropping change that could not be normalized");
                None
            }
        }
    }

    /// Apply a normalized change event to the store.
    pub fn apply(&self, event: &ChangeEvent) -> ApplyReport {
        let report = self.reconciler.apply_change(event, &mut self.store.write());
        self.publish(event, report)
    }

    /// Log the failures of an applied event and notify the views it changed.
    fn publish(&self, event: &ChangeEvent, report: ApplyReport) -> ApplyReport {
        for failure in &report.failures {
            tracing::warn!(
                view = %failure.view,
                table = %event.table,
                error = %failure.error,
                "View could not apply change"
            );
        }

        if report.changed() {
            let views: Vec<ViewName> = report.changed_views().cloned().collect();
            tracing::debug!(table = %event.table, kind = ?event.kind, views = ?views, "Change applied");
            self.notify(StoreUpdate::Changed {
                table: event.table.clone(),
                kind: event.kind,
                views,
            });
        }

        report
    }

    /// Apply polled changes from `rx` until it closes or `cancel` fires.
    pub async fn run(&self, mut rx: mpsc::Receiver<PolledChange>, cancel: CancellationToken) {
        let settings = normalize::polled();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                change = rx.recv() => match change {
                    Some(change) => {
                        self.ingest(&settings, &change);
                    }
                    None => break,
                },
            }
        }

        tracing::info!("Watcher stopped");
    }

    /// Seed every view from `source` and keep them live by polling it, until
    /// `cancel` fires.
    ///
    /// The poll checkpoint is taken before the first snapshot fetch and the
    /// poll loop starts right away. Changes it reports while a view is still
    /// loading are buffered and replayed onto the snapshot.
    pub async fn watch_polled<S>(
        &self,
        source: Arc<S>,
        settings: PollSettings,
        cancel: CancellationToken,
    ) -> Vec<SeedReport>
    where
        S: SnapshotSource<Q> + PollSource + 'static,
        Q: Send + Sync,
    {
        let since = Utc::now();
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let poll_task = poller::spawn(
            Arc::clone(&source),
            self.tables.clone(),
            settings,
            since,
            tx,
            cancel.clone(),
        );

        let (reports, ()) = tokio::join!(self.load_snapshots(&*source), self.run(rx, cancel));

        if let Err(e) = poll_task.await {
            tracing::error!(error = %e, "Poll task failed");
        }

        reports
    }

    fn notify(&self, update: StoreUpdate) {
        // no subscribers is fine
        let _ = self.updates.send(update);
    }
}

impl<Q> std::fmt::Debug for Watcher<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("views", &self.plans.len())
            .field("reconciler", &self.reconciler)
            .finish()
    }
}
