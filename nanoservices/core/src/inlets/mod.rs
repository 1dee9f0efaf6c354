use std::fmt;
use std::sync::Arc;

use relay_utils::{BoxError, Record};

use crate::lifecycle::Lifecycle;
use crate::link::Update;

pub mod null;
pub mod traits;

pub use null::NullInlet;
pub use traits::{Inlet, Pulled};

/// An inlet as attached to links: the capability plus its lifecycle guard.
///
/// Nodes are shared through `Arc`, so one inlet may feed several links while
/// its start and shutdown hooks still run once.
pub struct InletNode {
    inlet: Box<dyn Inlet>,
    lifecycle: Lifecycle,
}

impl InletNode {
    pub fn new(inlet: impl Inlet + 'static) -> Arc<Self> {
        Arc::new(Self {
            inlet: Box::new(inlet),
            lifecycle: Lifecycle::new(),
        })
    }

    pub fn name(&self) -> &str {
        self.inlet.name()
    }

    pub fn inner(&self) -> &dyn Inlet {
        self.inlet.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    pub fn try_start(&self) -> Result<bool, BoxError> {
        self.lifecycle.try_start(|| self.inlet.on_start())
    }

    pub fn try_shutdown(&self) -> Result<bool, BoxError> {
        self.lifecycle.try_shutdown(|| self.inlet.on_shutdown())
    }

    /// Pulls once and normalizes the result into a list of records.
    pub async fn pull(&self, update: &Update) -> Result<Vec<Record>, BoxError> {
        let records = match self.inlet.pull(update).await? {
            Pulled::One(payload) => vec![self.inlet.new_record(payload, None)],
            Pulled::Many(payloads) => payloads
                .into_iter()
                .map(|payload| self.inlet.new_record(payload, None))
                .collect(),
            Pulled::Records(records) => records,
        };
        Ok(records)
    }
}

impl fmt::Debug for InletNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InletNode")
            .field("name", &self.name())
            .field("active", &self.is_active())
            .finish()
    }
}
