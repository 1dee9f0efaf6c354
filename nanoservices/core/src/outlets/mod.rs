use std::fmt;
use std::sync::Arc;

use relay_utils::{Batch, BoxError};

use crate::lifecycle::Lifecycle;
use crate::link::Update;
use crate::processors::Processor;

pub mod null;
pub mod print;
pub mod traits;

pub use null::NullOutlet;
pub use print::PrintOutlet;
pub use traits::Outlet;

/// An outlet as attached to links: the capability, its own processor chain
/// and its lifecycle guard.
pub struct OutletNode {
    outlet: Box<dyn Outlet>,
    processors: Vec<Arc<dyn Processor>>,
    lifecycle: Lifecycle,
}

impl OutletNode {
    pub fn new(outlet: impl Outlet + 'static) -> Arc<Self> {
        Self::with_processors(outlet, Vec::new())
    }

    /// An outlet whose received batches first go through `processors`.
    pub fn with_processors(
        outlet: impl Outlet + 'static,
        processors: Vec<Arc<dyn Processor>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            outlet: Box::new(outlet),
            processors,
            lifecycle: Lifecycle::new(),
        })
    }

    pub fn name(&self) -> &str {
        self.outlet.name()
    }

    pub fn inner(&self) -> &dyn Outlet {
        self.outlet.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    pub fn try_start(&self) -> Result<bool, BoxError> {
        self.lifecycle.try_start(|| self.outlet.on_start())
    }

    pub fn try_shutdown(&self) -> Result<bool, BoxError> {
        self.lifecycle.try_shutdown(|| self.outlet.on_shutdown())
    }

    pub async fn push(&self, batch: Batch, update: &Update) -> Result<(), BoxError> {
        if self.processors.is_empty() {
            return self.outlet.push(batch, update).await;
        }

        let mut records = batch.into_records();
        for processor in &self.processors {
            records = processor.process(records)?;
        }
        self.outlet.push(Batch::new(records), update).await
    }
}

impl fmt::Debug for OutletNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutletNode")
            .field("name", &self.name())
            .field("processors", &self.processors.len())
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::processor_fn;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use relay_utils::Record;

    #[derive(Default)]
    struct Collect {
        seen: Arc<Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl Outlet for Collect {
        fn name(&self) -> &str {
            "collect"
        }

        async fn push(&self, records: Batch, _: &Update) -> Result<(), BoxError> {
            self.seen.lock().push(records.len());
            Ok(())
        }
    }

    #[tokio::test]
    async fn outlet_processors_run_before_push() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first_only = processor_fn("first_only", |mut records: Vec<Record>| {
            records.truncate(1);
            Ok(records)
        });
        let node = OutletNode::with_processors(
            Collect { seen: seen.clone() },
            vec![Arc::new(first_only)],
        );

        let batch = Batch::new(vec![Record::from_payload(1), Record::from_payload(2)]);
        node.push(batch.clone(), &Update::new(Vec::new(), 0)).await.unwrap();

        assert_eq!(*seen.lock(), vec![1]);
        // the shared batch is left untouched
        assert_eq!(batch.len(), 2);
    }
}
