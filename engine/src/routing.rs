//! Table routing: which views are fed by which source table.

use crate::{error::Result, Error, TableName, ViewName};
use std::collections::HashMap;

/// Maps a physical source table to the views materialized from it.
///
/// One table can feed several views (fan-out); a view is fed by exactly one
/// table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingMap {
    /// Table -> views, in declaration order
    routes: HashMap<TableName, Vec<ViewName>>,
    /// View -> table, to keep the one-table-per-view invariant
    sources: HashMap<ViewName, TableName>,
}

impl RoutingMap {
    /// Create an empty routing map.
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            sources: HashMap::new(),
        }
    }

    /// Route `table` into `view`.
    ///
    /// Routing the same pair twice is a no-op. Routing a view from a second
    /// table fails.
    pub fn route(&mut self, table: impl Into<TableName>, view: impl Into<ViewName>) -> Result<()> {
        let table = table.into();
        let view = view.into();

        if let Some(existing) = self.sources.get(&view) {
            if *existing == table {
                return Ok(());
            }
            return Err(Error::ViewRoutedTwice {
                view,
                existing: existing.clone(),
                table,
            });
        }

        self.sources.insert(view.clone(), table.clone());
        self.routes.entry(table).or_default().push(view);
        Ok(())
    }

    /// Views fed by a table, in declaration order. Empty for unknown tables.
    pub fn views_for(&self, table: &str) -> &[ViewName] {
        self.routes.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The table feeding a view.
    pub fn table_for(&self, view: &str) -> Option<&TableName> {
        self.sources.get(view)
    }

    /// All routed tables.
    pub fn tables(&self) -> impl Iterator<Item = &TableName> {
        self.routes.keys()
    }

    /// Number of routed views.
    pub fn view_count(&self) -> usize {
        self.sources.len()
    }
}
