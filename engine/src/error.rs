//! Error types for the Rill engine.

use crate::{TableName, ViewName};
use thiserror::Error;

/// All possible errors from the Rill engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Declaration errors
    #[error("duplicate view name: {0}")]
    DuplicateViewName(ViewName),

    #[error("invalid view declaration: {0}")]
    InvalidDeclaration(String),

    #[error("view '{view}' is already fed by table '{existing}', cannot also route from '{table}'")]
    ViewRoutedTwice {
        view: ViewName,
        existing: TableName,
        table: TableName,
    },

    // Store errors
    #[error("unknown view: {0}")]
    UnknownView(ViewName),

    #[error("view '{view}' is fed by table '{expected}', not '{found}'")]
    TableMismatch {
        view: ViewName,
        expected: TableName,
        found: TableName,
    },

    // Payload errors
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("normalization failed: {0}")]
    Normalization(String),

    #[error("change event is missing {0}")]
    MissingField(&'static str),

    // Filter errors
    #[error("filter for view '{view}' failed: {reason}")]
    FilterEvaluation { view: ViewName, reason: String },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
