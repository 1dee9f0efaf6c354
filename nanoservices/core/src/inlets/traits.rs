use async_trait::async_trait;
use relay_utils::{BoxError, Metadata, Payload, Record, INLET_KEY};

use crate::link::Update;

/// What a single pull produced.
///
/// Inlets may hand back one payload, several payloads, or records they
/// already built with [`Inlet::new_record`]. Bare payloads are wrapped into
/// records by the link.
#[derive(Debug, Clone, PartialEq)]
pub enum Pulled {
    One(Payload),
    Many(Vec<Payload>),
    Records(Vec<Record>),
}

impl Pulled {
    pub fn empty() -> Self {
        Pulled::Records(Vec::new())
    }
}

impl From<Payload> for Pulled {
    fn from(payload: Payload) -> Self {
        Pulled::One(payload)
    }
}

impl From<Vec<Payload>> for Pulled {
    fn from(payloads: Vec<Payload>) -> Self {
        Pulled::Many(payloads)
    }
}

impl From<Record> for Pulled {
    fn from(record: Record) -> Self {
        Pulled::Records(vec![record])
    }
}

impl From<Vec<Record>> for Pulled {
    fn from(records: Vec<Record>) -> Self {
        Pulled::Records(records)
    }
}

/// A data producer polled once per transfer.
#[async_trait]
pub trait Inlet: Send + Sync {
    /// Human-readable name, stamped on every record this inlet creates.
    fn name(&self) -> &str;

    /// Metadata attached to every record this inlet creates.
    fn metadata(&self) -> Option<&Metadata> {
        None
    }

    /// Produce data for the transfer identified by `update`.
    async fn pull(&self, update: &Update) -> Result<Pulled, BoxError>;

    fn on_start(&self) -> Result<(), BoxError> {
        Ok(())
    }

    fn on_shutdown(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Builds a record carrying this inlet's metadata merged with `metadata`
    /// (local keys win) and stamped with the inlet's name.
    fn new_record(&self, payload: Payload, metadata: Option<Metadata>) -> Record {
        let mut full = self.metadata().cloned().unwrap_or_default();
        if let Some(local) = metadata {
            full.extend(local);
        }
        full.insert(
            INLET_KEY.to_string(),
            Payload::String(self.name().to_string()),
        );
        Record::new(payload, full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Thermometer {
        metadata: Metadata,
    }

    #[async_trait]
    impl Inlet for Thermometer {
        fn name(&self) -> &str {
            "thermometer"
        }

        fn metadata(&self) -> Option<&Metadata> {
            Some(&self.metadata)
        }

        async fn pull(&self, _: &Update) -> Result<Pulled, BoxError> {
            Ok(json!(21.5).into())
        }
    }

    #[test]
    fn new_record_merges_metadata_and_stamps_name() {
        let mut global = Metadata::new();
        global.insert("unit".into(), json!("C"));
        global.insert("room".into(), json!("hall"));
        let inlet = Thermometer { metadata: global };

        let mut local = Metadata::new();
        local.insert("room".into(), json!("kitchen"));
        let record = inlet.new_record(json!(20), Some(local));

        assert_eq!(record.metadata()["unit"], "C");
        assert_eq!(record.metadata()["room"], "kitchen");
        assert_eq!(record.inlet(), Some("thermometer"));
    }

    #[tokio::test]
    async fn inlet_trait_works() {
        let inlet = Thermometer {
            metadata: Metadata::new(),
        };
        let pulled = inlet.pull(&Update::new(Vec::new(), 0)).await.unwrap();
        assert_eq!(pulled, Pulled::One(json!(21.5)));
    }
}
