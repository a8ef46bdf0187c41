//! # Rill Watcher
//!
//! Async runtime around [`rill_engine`]: loads the snapshot of every view,
//! feeds backend changes through the reconciler, and notifies subscribers.
//!
//! Backends plug in through two traits:
//! - [`SnapshotSource`] answers the initial fetch of each view
//! - [`PollSource`] reports changes since a checkpoint, for backends that
//!   cannot push them
//!
//! [`PostgrestClient`] implements both and is driven by
//! [`Watcher::watch_polled`]. Push backends hand their payloads to the watcher
//! with the matching [`rill_engine::PayloadSettings`]: Supabase realtime
//! through [`Watcher::ingest`], per-view Firestore listeners through
//! [`Watcher::ingest_into`].

pub mod config;
pub mod error;
pub mod poller;
pub mod postgrest;
pub mod source;
pub mod watcher;

pub use config::{load_views, ConfigError, WatcherConfig};
pub use error::{Result, WatcherError};
pub use poller::{poll_loop, PollSettings};
pub use postgrest::PostgrestClient;
pub use source::{PollSource, SnapshotSource};
pub use watcher::{StoreReader, StoreUpdate, Watcher, WatcherOptions};
