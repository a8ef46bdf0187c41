//! Payload normalization.
//!
//! Every backend describes a change differently: Supabase nests `new` and
//! `old` objects, Firestore hands over a `doc`, polling transports produce a
//! flat `record`. [`PayloadSettings`] captures those differences as five
//! accessors and two kind sentinels, so the reconciler only ever sees
//! [`ChangeEvent`]s.

use crate::{
    error::Result, ChangeEvent, ChangeKind, Error, Record, RecordId, TableName, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

type Accessor<P, T> = Box<dyn Fn(&P) -> Option<T> + Send + Sync>;

/// Per-backend description of a native change payload.
pub struct PayloadSettings<P> {
    get_table: Accessor<P, TableName>,
    get_change_kind: Accessor<P, String>,
    get_new_record: Accessor<P, Value>,
    get_new_id: Accessor<P, RecordId>,
    get_old_id: Accessor<P, RecordId>,
    insert_sentinel: String,
    update_sentinel: String,
}

impl<P: 'static> PayloadSettings<P> {
    /// Start settings with the kind values that mean insert and update.
    ///
    /// Every other kind value is a delete. Accessors default to "absent".
    pub fn new(insert_sentinel: impl Into<String>, update_sentinel: impl Into<String>) -> Self {
        Self {
            get_table: Box::new(absent),
            get_change_kind: Box::new(absent),
            get_new_record: Box::new(absent),
            get_new_id: Box::new(absent),
            get_old_id: Box::new(absent),
            insert_sentinel: insert_sentinel.into(),
            update_sentinel: update_sentinel.into(),
        }
    }

    /// Set the source table accessor.
    pub fn table(mut self, f: impl Fn(&P) -> Option<TableName> + Send + Sync + 'static) -> Self {
        self.get_table = Box::new(f);
        self
    }

    /// Set the change kind accessor.
    pub fn change_kind(mut self, f: impl Fn(&P) -> Option<String> + Send + Sync + 'static) -> Self {
        self.get_change_kind = Box::new(f);
        self
    }

    /// Set the new record accessor.
    pub fn new_record(mut self, f: impl Fn(&P) -> Option<Value> + Send + Sync + 'static) -> Self {
        self.get_new_record = Box::new(f);
        self
    }

    /// Set the new id accessor.
    pub fn new_id(mut self, f: impl Fn(&P) -> Option<RecordId> + Send + Sync + 'static) -> Self {
        self.get_new_id = Box::new(f);
        self
    }

    /// Set the old id accessor.
    pub fn old_id(mut self, f: impl Fn(&P) -> Option<RecordId> + Send + Sync + 'static) -> Self {
        self.get_old_id = Box::new(f);
        self
    }

    /// Map a raw kind value onto a [`ChangeKind`].
    pub fn classify(&self, kind: &str) -> ChangeKind {
        if kind == self.insert_sentinel {
            ChangeKind::Insert
        } else if kind == self.update_sentinel {
            ChangeKind::Update
        } else {
            ChangeKind::Delete
        }
    }

    /// Turn a native payload into a [`ChangeEvent`].
    pub fn normalize(&self, payload: &P) -> Result<ChangeEvent> {
        let table = (self.get_table)(payload)
            .ok_or_else(|| Error::Normalization("payload has no table".to_string()))?;
        let raw_kind = (self.get_change_kind)(payload).ok_or_else(|| {
            Error::Normalization(format!("payload for table '{table}' has no change kind"))
        })?;
        let kind = self.classify(&raw_kind);

        let new_record = (self.get_new_record)(payload)
            .filter(|value| !is_empty_object(value))
            .map(Record::new)
            .transpose()
            .map_err(|e| Error::Normalization(format!("table '{table}': {e}")))?;

        let new_id = match ((self.get_new_id)(payload), &new_record) {
            (Some(id), Some(record)) if id != *record.id() => {
                return Err(Error::Normalization(format!(
                    "table '{table}': new id {id} does not match record id {}",
                    record.id()
                )));
            }
            (Some(id), _) => Some(id),
            (None, record) => record.as_ref().map(|r| r.id().clone()),
        };
        let old_id = (self.get_old_id)(payload);

        match kind {
            ChangeKind::Insert | ChangeKind::Update if new_record.is_none() => {
                return Err(Error::Normalization(format!(
                    "{raw_kind} payload for table '{table}' has no new record"
                )));
            }
            ChangeKind::Delete if old_id.is_none() => {
                return Err(Error::Normalization(format!(
                    "{raw_kind} payload for table '{table}' has no old id"
                )));
            }
            _ => {}
        }

        Ok(ChangeEvent {
            table,
            kind,
            new_record,
            new_id,
            old_id,
        })
    }
}

impl<P> std::fmt::Debug for PayloadSettings<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadSettings")
            .field("insert_sentinel", &self.insert_sentinel)
            .field("update_sentinel", &self.update_sentinel)
            .finish_non_exhaustive()
    }
}

fn absent<P, T>(_: &P) -> Option<T> {
    None
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(|o| o.is_empty()) || value.is_null()
}

fn string_at(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn id_at(value: &Value, object: &str) -> Option<RecordId> {
    value.get(object)?.get(crate::record::ID_FIELD).and_then(RecordId::from_value)
}

/// Settings for Supabase realtime `postgres_changes` payloads.
///
/// ```json
/// {"table": "countries", "eventType": "UPDATE", "new": {...}, "old": {"id": 1}}
/// ```
pub fn supabase() -> PayloadSettings<Value> {
    PayloadSettings::<Value>::new("INSERT", "UPDATE")
        .table(|p| string_at(p, "table"))
        .change_kind(|p| string_at(p, "eventType"))
        .new_record(|p| p.get("new").cloned())
        .new_id(|p| id_at(p, "new"))
        .old_id(|p| id_at(p, "old"))
}

/// Settings for Firestore document changes, as `{"type": ..., "doc": {...}}`.
///
/// Firestore payloads carry no collection name, so every change is stamped
/// with `table`, the collection the listener's view is declared over. A
/// listener feeds one view; pair these settings with `Reconciler::apply_to_view`
/// to keep its changes out of sibling views.
pub fn firestore(table: impl Into<TableName>) -> PayloadSettings<Value> {
    let table = table.into();
    PayloadSettings::<Value>::new("added", "modified")
        .table(move |_| Some(table.clone()))
        .change_kind(|p| string_at(p, "type"))
        .new_record(|p| p.get("doc").cloned())
        .new_id(|p| id_at(p, "doc"))
        .old_id(|p| id_at(p, "doc"))
}

/// A change detected by a polling transport (Prisma, PostgREST).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolledChange {
    /// `INSERT`, `UPDATE` or `DELETE`
    #[serde(rename = "type")]
    pub kind: String,
    /// Source table
    pub table: TableName,
    /// The row as returned by the backend
    pub record: Value,
    /// When the change happened (milliseconds since epoch)
    pub timestamp: Timestamp,
}

/// Settings for [`PolledChange`] payloads.
pub fn polled() -> PayloadSettings<PolledChange> {
    PayloadSettings::new("INSERT", "UPDATE")
        .table(|p: &PolledChange| Some(p.table.clone()))
        .change_kind(|p: &PolledChange| Some(p.kind.clone()))
        .new_record(|p: &PolledChange| Some(p.record.clone()))
        .new_id(polled_id)
        .old_id(polled_id)
}

fn polled_id(change: &PolledChange) -> Option<RecordId> {
    change
        .record
        .get(crate::record::ID_FIELD)
        .and_then(RecordId::from_value)
}
