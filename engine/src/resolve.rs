//! View declarations.
//!
//! Callers describe the views they want as a list of [`ViewSpec`]s: either a
//! bare table name, or a named view over a table with an optional custom
//! initial query and filter. [`resolve`] validates the list and turns it into
//! the routing map, filter registry and per-view seeding plan.

use crate::{
    error::Result, Error, Filter, FilterRegistry, Reconciler, RoutingMap, TableName, ViewName,
};
use serde::Deserialize;
use std::collections::HashSet;

/// A named view over a source table.
#[derive(Debug, Clone, Deserialize)]
pub struct ViewDeclaration<Q> {
    /// Unique view name
    pub name: ViewName,
    /// Source table
    pub table: TableName,
    /// Custom initial query; the transport's "select all" when absent
    pub query: Option<Q>,
    /// Inclusion filter; every record when absent
    pub filter: Option<Filter>,
}

impl<Q> ViewDeclaration<Q> {
    /// Declare view `name` over `table`.
    pub fn new(name: impl Into<ViewName>, table: impl Into<TableName>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            query: None,
            filter: None,
        }
    }

    /// Seed the view with a custom query.
    pub fn query(mut self, query: Q) -> Self {
        self.query = Some(query);
        self
    }

    /// Only keep records matching `filter`.
    pub fn filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// One entry of a view declaration list.
///
/// Deserializes from a JSON string (bare table name) or an object
/// (`{"name", "table", "query"?, "filter"?}`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ViewSpec<Q> {
    /// A view named after its table, unfiltered
    Table(TableName),
    /// A named view
    Declared(ViewDeclaration<Q>),
}

impl<Q> ViewSpec<Q> {
    /// Normalize into a declaration.
    pub fn into_declaration(self) -> ViewDeclaration<Q> {
        match self {
            ViewSpec::Table(table) => ViewDeclaration::new(table.clone(), table),
            ViewSpec::Declared(declaration) => declaration,
        }
    }

    /// The view name.
    pub fn name(&self) -> &str {
        match self {
            ViewSpec::Table(table) => table,
            ViewSpec::Declared(declaration) => &declaration.name,
        }
    }
}

impl<Q> From<&str> for ViewSpec<Q> {
    fn from(table: &str) -> Self {
        ViewSpec::Table(table.to_string())
    }
}

impl<Q> From<ViewDeclaration<Q>> for ViewSpec<Q> {
    fn from(declaration: ViewDeclaration<Q>) -> Self {
        ViewSpec::Declared(declaration)
    }
}

/// How to fetch a view's snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialQuery<Q> {
    /// Every row of the source table
    Default,
    /// A caller-supplied query
    Custom(Q),
}

/// A resolved view, ready to be seeded.
#[derive(Debug, Clone)]
pub struct ViewPlan<Q> {
    pub name: ViewName,
    pub table: TableName,
    pub query: InitialQuery<Q>,
    pub filter: Option<Filter>,
}

/// Output of [`resolve`].
#[derive(Debug, Clone)]
pub struct ResolvedViews<Q> {
    /// Table -> views
    pub routing: RoutingMap,
    /// View -> filter
    pub filters: FilterRegistry,
    /// Views in declaration order
    pub views: Vec<ViewPlan<Q>>,
}

impl<Q> ResolvedViews<Q> {
    /// Build a reconciler owning this routing map and filter registry.
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.routing.clone(), self.filters.clone())
    }

    /// Distinct source tables, in first-declaration order.
    pub fn tables(&self) -> Vec<TableName> {
        let mut seen = HashSet::new();
        self.views
            .iter()
            .filter(|plan| seen.insert(plan.table.as_str()))
            .map(|plan| plan.table.clone())
            .collect()
    }
}

/// Validate view specs and build routing, filters and seeding plans.
///
/// Validation happens before anything is built: a duplicate name fails the
/// whole call.
pub fn resolve<Q>(specs: impl IntoIterator<Item = ViewSpec<Q>>) -> Result<ResolvedViews<Q>> {
    let declarations: Vec<_> = specs
        .into_iter()
        .map(ViewSpec::into_declaration)
        .collect();

    let mut names = HashSet::new();
    for declaration in &declarations {
        if declaration.name.is_empty() {
            return Err(Error::InvalidDeclaration("view name is empty".to_string()));
        }
        if declaration.table.is_empty() {
            return Err(Error::InvalidDeclaration(format!(
                "view '{}' has no table",
                declaration.name
            )));
        }
        if !names.insert(declaration.name.as_str()) {
            return Err(Error::DuplicateViewName(declaration.name.clone()));
        }
        if let Some(Filter::Rule(rule)) = &declaration.filter {
            rule.validate()?;
        }
    }

    let mut routing = RoutingMap::new();
    let mut filters = FilterRegistry::new();
    let mut views = Vec::with_capacity(declarations.len());

    for declaration in declarations {
        routing.route(declaration.table.clone(), declaration.name.clone())?;
        filters.register(declaration.name.clone(), declaration.filter.clone());
        views.push(ViewPlan {
            name: declaration.name,
            table: declaration.table,
            query: declaration
                .query
                .map_or(InitialQuery::Default, InitialQuery::Custom),
            filter: declaration.filter,
        });
    }

    Ok(ResolvedViews {
        routing,
        filters,
        views,
    })
}
