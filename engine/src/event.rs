//! Normalized change events.

use crate::{Record, RecordId, TableName};
use serde::{Deserialize, Serialize};

/// Kind of change reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A backend-independent change notification for one record of one table.
///
/// Insert and Update carry the new record and its id; Delete carries the id
/// of the record going away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Source table the change happened in
    pub table: TableName,
    /// What happened
    pub kind: ChangeKind,
    /// The record after the change
    pub new_record: Option<Record>,
    /// Id of the record after the change
    pub new_id: Option<RecordId>,
    /// Id of the record removed or replaced
    pub old_id: Option<RecordId>,
}

impl ChangeEvent {
    /// An insert of `record` into `table`.
    pub fn insert(table: impl Into<TableName>, record: Record) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Insert,
            new_id: Some(record.id().clone()),
            new_record: Some(record),
            old_id: None,
        }
    }

    /// An update of `record` in `table`.
    pub fn update(table: impl Into<TableName>, record: Record) -> Self {
        let id = record.id().clone();
        Self {
            table: table.into(),
            kind: ChangeKind::Update,
            new_id: Some(id.clone()),
            new_record: Some(record),
            old_id: Some(id),
        }
    }

    /// A delete of the record `id` from `table`.
    pub fn delete(table: impl Into<TableName>, id: impl Into<RecordId>) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Delete,
            new_record: None,
            new_id: None,
            old_id: Some(id.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constructors_fill_ids() {
        let record = Record::new(json!({"id": 7, "name": "Italy"})).unwrap();

        let insert = ChangeEvent::insert("countries", record.clone());
        assert_eq!(insert.kind, ChangeKind::Insert);
        assert_eq!(insert.new_id, Some(RecordId::Int(7)));
        assert_eq!(insert.old_id, None);

        let update = ChangeEvent::update("countries", record);
        assert_eq!(update.old_id, Some(RecordId::Int(7)));

        let delete = ChangeEvent::delete("countries", 7i64);
        assert_eq!(delete.kind, ChangeKind::Delete);
        assert!(delete.new_record.is_none());
        assert_eq!(delete.old_id, Some(RecordId::Int(7)));
    }
}
