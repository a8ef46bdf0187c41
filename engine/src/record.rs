//! Record types for view contents.
//!
//! A record is whatever JSON object the backend hands us, as long as it
//! carries an `id`. Everything apart from the id is opaque to the engine and
//! only ever inspected by view filters.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Name of the identity field every record must carry.
pub const ID_FIELD: &str = "id";

/// Identity of a record within a source table.
///
/// Integer and string ids never compare equal, so `1` and `"1"` are
/// different records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    /// Read an id out of a JSON value. Floats, booleans and nested values are
    /// not valid ids.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RecordId::Int),
            Value::String(s) => Some(RecordId::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{n}"),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Int(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId::Text(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        RecordId::Text(id)
    }
}

/// A record materialized in a view.
///
/// Serializes as its plain JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Record {
    id: RecordId,
    payload: Value,
}

impl Record {
    /// Build a record from a JSON object carrying an `id`.
    pub fn new(payload: Value) -> Result<Self> {
        let object = payload
            .as_object()
            .ok_or_else(|| Error::InvalidRecord(format!("expected an object, got {payload}")))?;

        let raw_id = object
            .get(ID_FIELD)
            .ok_or_else(|| Error::InvalidRecord("missing 'id' field".to_string()))?;

        let id = RecordId::from_value(raw_id).ok_or_else(|| {
            Error::InvalidRecord(format!("'id' must be a string or an integer, got {raw_id}"))
        })?;

        Ok(Self { id, payload })
    }

    /// The record identity.
    pub fn id(&self) -> &RecordId {
        &self.id
    }

    /// The full JSON payload, `id` included.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Look up a top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }

    /// Whether the soft-delete column is set (present and not null).
    pub fn is_soft_deleted(&self, field: &str) -> bool {
        self.get(field).is_some_and(|v| !v.is_null())
    }

    /// Give back the JSON payload.
    pub fn into_payload(self) -> Value {
        self.payload
    }
}

impl TryFrom<Value> for Record {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Record::new(value)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_record() {
        let record = Record::new(json!({"id": 1, "name": "France"})).unwrap();

        assert_eq!(record.id(), &RecordId::Int(1));
        assert_eq!(record.get("name"), Some(&json!("France")));
        assert_eq!(record.get("capital"), None);
    }

    #[test]
    fn string_and_int_ids_differ() {
        let a = Record::new(json!({"id": 1})).unwrap();
        let b = Record::new(json!({"id": "1"})).unwrap();

        assert_eq!(b.id(), &RecordId::Text("1".into()));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn reject_invalid_records() {
        assert!(matches!(
            Record::new(json!([1, 2])),
            Err(Error::InvalidRecord(_))
        ));
        assert!(matches!(
            Record::new(json!({"name": "no id"})),
            Err(Error::InvalidRecord(_))
        ));
        assert!(matches!(
            Record::new(json!({"id": 1.5})),
            Err(Error::InvalidRecord(_))
        ));
        assert!(matches!(
            Record::new(json!({"id": null})),
            Err(Error::InvalidRecord(_))
        ));
    }

    #[test]
    fn soft_delete_flag() {
        let live = Record::new(json!({"id": 1, "deleted_at": null})).unwrap();
        let gone = Record::new(json!({"id": 2, "deleted_at": "2024-01-01T00:00:00Z"})).unwrap();
        let untracked = Record::new(json!({"id": 3})).unwrap();

        assert!(!live.is_soft_deleted("deleted_at"));
        assert!(gone.is_soft_deleted("deleted_at"));
        assert!(!untracked.is_soft_deleted("deleted_at"));
    }

    #[test]
    fn serializes_as_payload() {
        let record = Record::new(json!({"id": "doc-1", "v": "a"})).unwrap();

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"id":"doc-1","v":"a"}"#);

        let parsed: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(record, parsed);

        assert!(serde_json::from_str::<Record>(r#"{"v":"a"}"#).is_err());
    }

    #[test]
    fn id_display() {
        assert_eq!(RecordId::Int(42).to_string(), "42");
        assert_eq!(RecordId::from("abc").to_string(), "abc");
    }
}
