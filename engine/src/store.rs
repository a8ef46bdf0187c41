//! Store - the in-memory state container.
//!
//! The Store holds one slot per declared view. A slot is created empty the
//! moment its view is declared, so change events that arrive before the
//! view's snapshot always find it. While the snapshot is still loading,
//! such events are parked in the slot's backlog and replayed once the
//! snapshot is installed.

use crate::{error::Result, ChangeEvent, Collection, Error, Record, ViewName};
use std::collections::HashMap;

/// Loading state of a view slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotState {
    /// Waiting for the initial snapshot; live events are buffered
    Loading { backlog: Vec<ChangeEvent> },
    /// Snapshot installed; live events apply directly
    Ready,
}

/// The materialized state of one view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSlot {
    records: Collection,
    state: SlotState,
}

impl ViewSlot {
    fn loading() -> Self {
        Self {
            records: Collection::new(),
            state: SlotState::Loading {
                backlog: Vec::new(),
            },
        }
    }

    /// Records currently in the view.
    pub fn records(&self) -> &Collection {
        &self.records
    }

    /// Whether the snapshot has been installed.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, SlotState::Ready)
    }

    /// Number of events waiting for the snapshot.
    pub fn backlog_len(&self) -> usize {
        match &self.state {
            SlotState::Loading { backlog } => backlog.len(),
            SlotState::Ready => 0,
        }
    }

    pub(crate) fn records_mut(&mut self) -> &mut Collection {
        &mut self.records
    }

    /// Park an event until the snapshot lands. Returns false if the slot is
    /// already ready, in which case the caller should apply it directly.
    pub(crate) fn buffer(&mut self, event: &ChangeEvent) -> bool {
        match &mut self.state {
            SlotState::Loading { backlog } => {
                backlog.push(event.clone());
                true
            }
            SlotState::Ready => false,
        }
    }

    /// Replace the contents with a snapshot and hand back the backlog.
    pub(crate) fn install(&mut self, records: Collection) -> Vec<ChangeEvent> {
        self.records = records;
        match std::mem::replace(&mut self.state, SlotState::Ready) {
            SlotState::Loading { backlog } => backlog,
            SlotState::Ready => Vec::new(),
        }
    }
}

/// The main store holding every view.
#[derive(Debug, Clone, Default)]
pub struct Store {
    /// Slots by view name
    slots: HashMap<ViewName, ViewSlot>,
    /// View names in declaration order
    order: Vec<ViewName>,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Declare a view, creating an empty slot that waits for its snapshot.
    ///
    /// Returns false if the view was already declared; its slot is left
    /// untouched.
    pub fn declare(&mut self, view: impl Into<ViewName>) -> bool {
        let view = view.into();
        if self.slots.contains_key(&view) {
            return false;
        }
        self.slots.insert(view.clone(), ViewSlot::loading());
        self.order.push(view);
        true
    }

    /// Declare a view whose contents are already known.
    ///
    /// Duplicate ids keep their first occurrence.
    pub fn declare_ready(
        &mut self,
        view: impl Into<ViewName>,
        records: impl IntoIterator<Item = Record>,
    ) -> bool {
        let view = view.into();
        if !self.declare(view.clone()) {
            return false;
        }
        if let Some(slot) = self.slots.get_mut(&view) {
            slot.install(Collection::from_records(records));
        }
        true
    }

    /// Records of a view.
    pub fn get(&self, view: &str) -> Option<&Collection> {
        self.slots.get(view).map(ViewSlot::records)
    }

    /// The slot of a view.
    pub fn slot(&self, view: &str) -> Option<&ViewSlot> {
        self.slots.get(view)
    }

    pub(crate) fn slot_mut(&mut self, view: &str) -> Result<&mut ViewSlot> {
        self.slots
            .get_mut(view)
            .ok_or_else(|| Error::UnknownView(view.to_string()))
    }

    /// Check if a view is declared.
    pub fn contains(&self, view: &str) -> bool {
        self.slots.contains_key(view)
    }

    /// Whether a view's snapshot has been installed.
    pub fn is_ready(&self, view: &str) -> bool {
        self.slots.get(view).is_some_and(ViewSlot::is_ready)
    }

    /// Whether every declared view is ready.
    pub fn all_ready(&self) -> bool {
        self.slots.values().all(ViewSlot::is_ready)
    }

    /// View names in declaration order.
    pub fn views(&self) -> impl Iterator<Item = &ViewName> {
        self.order.iter()
    }

    /// Number of records in a view.
    pub fn len(&self, view: &str) -> Option<usize> {
        self.get(view).map(Collection::len)
    }

    /// Number of declared views.
    pub fn view_count(&self) -> usize {
        self.slots.len()
    }

    /// Clone every view's records, in declaration order.
    pub fn export(&self) -> Vec<(ViewName, Vec<Record>)> {
        self.order
            .iter()
            .filter_map(|view| {
                self.get(view)
                    .map(|c| (view.clone(), c.records().to_vec()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: i64) -> Record {
        Record::new(json!({"id": id})).unwrap()
    }

    #[test]
    fn declare_creates_empty_loading_slot() {
        let mut store = Store::new();

        assert!(store.declare("countries"));
        assert!(store.contains("countries"));
        assert_eq!(store.len("countries"), Some(0));
        assert!(!store.is_ready("countries"));
        assert!(!store.all_ready());
    }

    #[test]
    fn redeclare_keeps_slot() {
        let mut store = Store::new();
        store.declare_ready("countries", vec![record(1)]);

        assert!(!store.declare("countries"));
        assert_eq!(store.len("countries"), Some(1));
        assert!(store.is_ready("countries"));
    }

    #[test]
    fn undeclared_view_is_unknown() {
        let mut store = Store::new();

        assert!(store.get("nope").is_none());
        assert_eq!(
            store.slot_mut("nope").unwrap_err(),
            Error::UnknownView("nope".into())
        );
    }

    #[test]
    fn buffer_until_install() {
        let mut store = Store::new();
        store.declare("countries");

        let event = ChangeEvent::insert("countries", record(2));
        let slot = store.slot_mut("countries").unwrap();
        assert!(slot.buffer(&event));
        assert_eq!(slot.backlog_len(), 1);

        let backlog = slot.install(Collection::from_records(vec![record(1)]));
        assert_eq!(backlog, vec![event.clone()]);
        assert!(slot.is_ready());
        assert_eq!(slot.backlog_len(), 0);

        // once ready, events are no longer buffered
        assert!(!slot.buffer(&event));
    }

    #[test]
    fn views_in_declaration_order() {
        let mut store = Store::new();
        store.declare("b");
        store.declare("a");
        store.declare_ready("c", vec![record(1)]);

        let views: Vec<_> = store.views().cloned().collect();
        assert_eq!(views, vec!["b", "a", "c"]);

        let export = store.export();
        assert_eq!(export[2].0, "c");
        assert_eq!(export[2].1.len(), 1);
        assert_eq!(store.view_count(), 3);
    }
}
