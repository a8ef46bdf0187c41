//! # Rill Engine
//!
//! Filter-aware reconciliation of remote change events into live views.
//!
//! A backend (Supabase realtime, Firestore listeners, a Prisma or PostgREST
//! poller) emits insert/update/delete notifications for rows of its tables.
//! This crate keeps a set of named, filtered views of those tables up to date:
//! each view always holds exactly the rows of its source table that satisfy
//! its filter, including when an update moves a row into or out of the
//! filter.
//!
//! ## Design Principles
//!
//! - **No IO**: fetching snapshots and receiving events is the caller's job
//! - **Backend-agnostic**: backends differ only in their [`PayloadSettings`]
//! - **No globals**: routing and filters belong to one [`Reconciler`]
//! - **Testable**: pure logic, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Views
//!
//! A view is declared with a [`ViewSpec`]: a bare table name, or a
//! [`ViewDeclaration`] naming the view, its source table, and optionally a
//! custom initial query and a [`Filter`]. Several views can share one table.
//!
//! ### Change Events
//!
//! Native payloads are turned into [`ChangeEvent`]s by [`PayloadSettings`]:
//! - [`normalize::supabase`] - realtime `postgres_changes` payloads
//! - [`normalize::firestore`] - document changes of one listener
//! - [`normalize::polled`] - rows found by a polling transport
//!
//! ### Reconciliation
//!
//! [`Reconciler::apply_change`] applies an event to every view routed from
//! its table. See [`reconcile`] for the exact rules.
//!
//! ### Snapshots
//!
//! Each view is seeded from an initial fetch with [`Reconciler::seed`].
//! Events that arrive before the snapshot are buffered and replayed after it.
//!
//! ## Quick Start
//!
//! ```rust
//! use rill_engine::{
//!     normalize, resolve, FilterRule, Store, ViewDeclaration, ViewSpec,
//! };
//! use serde_json::json;
//!
//! // 1. Declare views
//! let specs: Vec<ViewSpec<String>> = vec![
//!     "countries".into(),
//!     ViewDeclaration::new("big", "countries")
//!         .filter(FilterRule::Gte { field: "GDP".into(), value: json!(100) })
//!         .into(),
//! ];
//! let resolved = resolve(specs).unwrap();
//! let reconciler = resolved.reconciler();
//!
//! // 2. Create the store and seed every view
//! let mut store = Store::new();
//! for plan in &resolved.views {
//!     store.declare(plan.name.clone());
//! }
//! let rows = vec![json!({"id": 1, "name": "France", "GDP": 150})];
//! for plan in &resolved.views {
//!     reconciler.seed(&mut store, &plan.name, rows.clone()).unwrap();
//! }
//!
//! // 3. Apply live changes
//! let payload = json!({
//!     "table": "countries",
//!     "eventType": "UPDATE",
//!     "new": {"id": 1, "name": "France", "GDP": 50},
//!     "old": {"id": 1}
//! });
//! let event = normalize::supabase().normalize(&payload).unwrap();
//! reconciler.apply_change(&event, &mut store);
//!
//! assert_eq!(store.len("countries"), Some(1));
//! assert_eq!(store.len("big"), Some(0));
//! ```

pub mod collection;
pub mod error;
pub mod event;
pub mod filter;
pub mod normalize;
pub mod reconcile;
pub mod record;
pub mod resolve;
pub mod routing;
pub mod snapshot;
pub mod store;

// Re-export main types at crate root
pub use collection::Collection;
pub use error::Error;
pub use event::{ChangeEvent, ChangeKind};
pub use filter::{Filter, FilterRegistry, FilterRule};
pub use normalize::{PayloadSettings, PolledChange};
pub use reconcile::{
    apply_change, ApplyReport, Reconciler, ViewFailure, ViewMutation, ViewOutcome,
};
pub use record::{Record, RecordId};
pub use resolve::{resolve, InitialQuery, ResolvedViews, ViewDeclaration, ViewPlan, ViewSpec};
pub use routing::RoutingMap;
pub use snapshot::{SeedOptions, SeedReport};
pub use store::{SlotState, Store, ViewSlot};

/// Type aliases for clarity
pub type ViewName = String;
pub type TableName = String;
pub type Timestamp = i64;
