pub mod error;

use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::Arc;

pub use error::{BoxError, Error, LinkError, PlannerError, Stage, TransferError};

pub type RelayResult<T> = Result<T, Error>;

/// Free-form payload carried by a record.
pub type Payload = serde_json::Value;

/// Key/value metadata attached to a record.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key stamped on every record with the name of the inlet that produced it.
pub const INLET_KEY: &str = "__inlet__";

/// A unit of data moving from inlets to outlets.
///
/// Records are treated as immutable once created. Inlets should prefer
/// `Inlet::new_record` over `Record::new` so their global metadata and
/// identity get attached.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    payload: Payload,
    metadata: Metadata,
}

impl Record {
    pub fn new(payload: impl Into<Payload>, metadata: Metadata) -> Self {
        Self {
            payload: payload.into(),
            metadata,
        }
    }

    pub fn from_payload(payload: impl Into<Payload>) -> Self {
        Self::new(payload, Metadata::new())
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Name of the inlet that produced this record, if it was stamped.
    pub fn inlet(&self) -> Option<&str> {
        self.metadata.get(INLET_KEY).and_then(|v| v.as_str())
    }

    pub fn into_parts(self) -> (Payload, Metadata) {
        (self.payload, self.metadata)
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Record(payload={}, metadata={})",
            self.payload,
            serde_json::Value::Object(self.metadata.clone())
        )
    }
}

/// A list of records handed to outlets.
///
/// Cloning a `Batch` is shallow: clones point at the same list. Outlets that
/// want to modify what they received go through `make_mut`, which copies the
/// list first whenever it is shared.
#[derive(Clone, Debug, Default)]
pub struct Batch(pub Arc<Vec<Record>>);

impl Batch {
    pub fn new(records: Vec<Record>) -> Self {
        Batch(Arc::new(records))
    }

    pub fn records(&self) -> &Vec<Record> {
        &self.0
    }

    /// Independent copy of the records, sharing nothing with `self`.
    pub fn deep_copy(&self) -> Self {
        Batch::new(self.0.as_ref().clone())
    }

    pub fn make_mut(&mut self) -> &mut Vec<Record> {
        Arc::make_mut(&mut self.0)
    }

    /// True when both batches refer to the very same list.
    pub fn ptr_eq(&self, other: &Batch) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn into_records(self) -> Vec<Record> {
        Arc::try_unwrap(self.0).unwrap_or_else(|shared| shared.as_ref().clone())
    }
}

impl Deref for Batch {
    type Target = [Record];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Record>> for Batch {
    fn from(records: Vec<Record>) -> Self {
        Batch::new(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_reports_inlet() {
        let mut metadata = Metadata::new();
        metadata.insert(INLET_KEY.to_string(), json!("weather"));
        let record = Record::new(json!({"t": 21}), metadata);
        assert_eq!(record.inlet(), Some("weather"));
        assert_eq!(record.payload()["t"], 21);
    }

    #[test]
    fn batch_clone_is_shared_until_mutated() {
        let batch = Batch::new(vec![Record::from_payload(1), Record::from_payload(2)]);
        let mut other = batch.clone();
        assert!(batch.ptr_eq(&other));

        other.make_mut().pop();
        assert!(!batch.ptr_eq(&other));
        assert_eq!(batch.len(), 2);
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn deep_copy_is_independent() {
        let batch = Batch::new(vec![Record::from_payload("a")]);
        let copy = batch.deep_copy();
        assert!(!batch.ptr_eq(&copy));
        assert_eq!(batch.records(), copy.records());
    }
}
