//! Ordered record collections.
//!
//! A collection is the materialized contents of one view. Order is arrival
//! order: appends go to the end and replacements keep their position.

use crate::{Record, RecordId};
use serde::{Deserialize, Serialize};

/// An ordered sequence of records, unique by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection {
    records: Vec<Record>,
}

impl Collection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Build a collection from records, keeping the first occurrence of each id.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut collection = Self::new();
        for record in records {
            if collection.position(record.id()).is_none() {
                collection.append(record);
            }
        }
        collection
    }

    /// Index of the record with the given id.
    pub fn position(&self, id: &RecordId) -> Option<usize> {
        self.records.iter().position(|r| r.id() == id)
    }

    /// Get a record by id.
    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.iter().find(|r| r.id() == id)
    }

    /// Append a record at the end.
    pub fn append(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Replace the record at `index`, keeping its position.
    ///
    /// Returns the previous record.
    pub fn replace_at(&mut self, index: usize, record: Record) -> Record {
        std::mem::replace(&mut self.records[index], record)
    }

    /// Remove the record at `index`, shifting later records left.
    pub fn remove_at(&mut self, index: usize) -> Record {
        self.records.remove(index)
    }

    /// All records in order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Iterate records in order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl IntoIterator for Collection {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
