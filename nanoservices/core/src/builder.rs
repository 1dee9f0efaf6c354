use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use relay_utils::LinkError;
use tokio::sync::Semaphore;

use crate::config::types::LinkSettings;
use crate::inlets::{Inlet, InletNode};
use crate::link::Link;
use crate::outlets::{Outlet, OutletNode};
use crate::processors::{Batcher, Processor};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("link interval is required")]
    NoInterval,
    #[error("invalid link interval: {0} seconds")]
    InvalidInterval(f64),
    #[error("inlet concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("invalid link nodes: {0}")]
    Nodes(#[from] LinkError),
}

pub struct LinkBuilder {
    interval: Option<Duration>,
    invalid_interval: Option<f64>,
    tags: Vec<String>,
    inlets: Vec<Arc<InletNode>>,
    outlets: Vec<Arc<OutletNode>>,
    processors: Vec<Arc<dyn Processor>>,
    batchers: Vec<Arc<dyn Batcher>>,
    copy_records: bool,
    ignore_exceptions: bool,
    inlet_concurrency: Option<usize>,
    immediate_transfer: bool,
}

impl Default for LinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkBuilder {
    pub fn new() -> Self {
        Self {
            interval: None,
            invalid_interval: None,
            tags: Vec::new(),
            inlets: Vec::new(),
            outlets: Vec::new(),
            processors: Vec::new(),
            batchers: Vec::new(),
            copy_records: true,
            ignore_exceptions: false,
            inlet_concurrency: None,
            immediate_transfer: true,
        }
    }

    /// Apply deserialized settings on top of what was set so far.
    pub fn settings(mut self, settings: &LinkSettings) -> Self {
        self = self.interval(settings.interval.get());
        if let Some(tags) = &settings.tags {
            self = self.tags(tags.clone().into_vec());
        }
        if let Some(copy_records) = settings.copy_records {
            self.copy_records = copy_records;
        }
        if let Some(ignore_exceptions) = settings.ignore_exceptions {
            self.ignore_exceptions = ignore_exceptions;
        }
        if settings.inlet_concurrency.is_some() {
            self.inlet_concurrency = settings.inlet_concurrency;
        }
        if let Some(immediate_transfer) = settings.immediate_transfer {
            self.immediate_transfer = immediate_transfer;
        }
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self.invalid_interval = None;
        self
    }

    /// Interval in fractional seconds. Negative or non-finite values fail
    /// the build.
    pub fn interval_secs(mut self, secs: f64) -> Self {
        match Duration::try_from_secs_f64(secs) {
            Ok(interval) => self = self.interval(interval),
            Err(_) => self.invalid_interval = Some(secs),
        }
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn inlet(self, inlet: impl Inlet + 'static) -> Self {
        self.inlet_node(InletNode::new(inlet))
    }

    /// Attach an inlet node that may be shared with other links.
    pub fn inlet_node(mut self, inlet: Arc<InletNode>) -> Self {
        self.inlets.push(inlet);
        self
    }

    pub fn outlet(self, outlet: impl Outlet + 'static) -> Self {
        self.outlet_node(OutletNode::new(outlet))
    }

    /// Attach an outlet node that may be shared with other links.
    pub fn outlet_node(mut self, outlet: Arc<OutletNode>) -> Self {
        self.outlets.push(outlet);
        self
    }

    pub fn processor(self, processor: impl Processor + 'static) -> Self {
        self.shared_processor(Arc::new(processor))
    }

    /// Attach a processor the caller keeps a handle to, such as a buffer it
    /// wants to flush.
    pub fn shared_processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn batcher(self, batcher: impl Batcher + 'static) -> Self {
        self.shared_batcher(Arc::new(batcher))
    }

    pub fn shared_batcher(mut self, batcher: Arc<dyn Batcher>) -> Self {
        self.batchers.push(batcher);
        self
    }

    pub fn copy_records(mut self, copy_records: bool) -> Self {
        self.copy_records = copy_records;
        self
    }

    pub fn ignore_exceptions(mut self, ignore_exceptions: bool) -> Self {
        self.ignore_exceptions = ignore_exceptions;
        self
    }

    /// Maximum number of inlets pulled at the same time. Unbounded when not set.
    pub fn inlet_concurrency(mut self, limit: usize) -> Self {
        self.inlet_concurrency = Some(limit);
        self
    }

    pub fn immediate_transfer(mut self, immediate_transfer: bool) -> Self {
        self.immediate_transfer = immediate_transfer;
        self
    }

    pub fn build(self) -> Result<Arc<Link>, BuildError> {
        if let Some(secs) = self.invalid_interval {
            return Err(BuildError::InvalidInterval(secs));
        }
        let interval = self.interval.ok_or(BuildError::NoInterval)?;

        let inlet_concurrency = match self.inlet_concurrency {
            Some(0) => return Err(BuildError::ZeroConcurrency),
            Some(limit) => limit.min(Semaphore::MAX_PERMITS),
            None => Semaphore::MAX_PERMITS,
        };

        let link = Arc::new(Link {
            inlets: RwLock::new(Vec::new()),
            outlets: RwLock::new(Vec::new()),
            processors: self.processors,
            batchers: self.batchers,
            interval,
            tags: self.tags,
            copy_records: self.copy_records,
            ignore_exceptions: self.ignore_exceptions,
            inlet_concurrency,
            immediate_transfer: self.immediate_transfer,
            transfer_number: AtomicU64::new(0),
            job: Mutex::new(None),
        });
        link.add_inlets(self.inlets)?;
        link.add_outlets(self.outlets)?;
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_config;
    use crate::inlets::NullInlet;
    use crate::outlets::NullOutlet;

    #[test]
    fn builder_applies_defaults() {
        let link = LinkBuilder::new()
            .interval_secs(1.5)
            .tags(["a", "b"])
            .inlet(NullInlet)
            .outlet(NullOutlet)
            .build()
            .unwrap();

        assert_eq!(link.interval(), Duration::from_millis(1500));
        assert_eq!(link.tags(), ["a", "b"]);
        assert!(link.copy_records());
        assert!(!link.ignore_exceptions());
        assert!(link.immediate_transfer());
        assert_eq!(link.inlet_concurrency(), Semaphore::MAX_PERMITS);
        assert_eq!(link.job(), None);
    }

    #[test]
    fn builder_requires_interval() {
        let result = LinkBuilder::new().inlet(NullInlet).build();
        assert!(matches!(result, Err(BuildError::NoInterval)));
    }

    #[test]
    fn builder_rejects_negative_interval() {
        let result = LinkBuilder::new().interval_secs(-1.0).build();
        assert!(matches!(result, Err(BuildError::InvalidInterval(s)) if s == -1.0));
    }

    #[test]
    fn builder_rejects_zero_concurrency() {
        let result = LinkBuilder::new()
            .interval(Duration::from_secs(1))
            .inlet_concurrency(0)
            .build();
        assert!(matches!(result, Err(BuildError::ZeroConcurrency)));
    }

    #[test]
    fn builder_rejects_shared_node_twice() {
        let inlet = InletNode::new(NullInlet);
        let result = LinkBuilder::new()
            .interval(Duration::from_secs(1))
            .inlet_node(inlet.clone())
            .inlet_node(inlet)
            .build();
        assert!(matches!(
            result,
            Err(BuildError::Nodes(LinkError::DuplicateInlet(_)))
        ));
    }

    #[test]
    fn builder_reads_settings() {
        let config = parse_config(
            r#"
links:
  weather:
    interval: 500ms
    tags: weather
    copy_records: false
    inlet_concurrency: 4
"#,
        )
        .unwrap();

        let link = LinkBuilder::new()
            .settings(&config.links["weather"])
            .build()
            .unwrap();
        assert_eq!(link.interval(), Duration::from_millis(500));
        assert_eq!(link.tags(), ["weather"]);
        assert!(!link.copy_records());
        assert_eq!(link.inlet_concurrency(), 4);
    }
}
