//! The transfer engine.
//!
//! A [`Link`] binds a set of inlets to a set of outlets. One transfer pulls
//! from every inlet, runs the records through the link's processors and
//! batchers, then pushes each resulting batch to every outlet. Links are
//! built with [`LinkBuilder`](crate::builder::LinkBuilder) and shared as
//! `Arc<Link>` between the planner, its scheduler and the host program.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use relay_utils::{BoxError, LinkError, Stage, TransferError};

use crate::builder::LinkBuilder;
use crate::inlets::InletNode;
use crate::outlets::OutletNode;
use crate::planner::JobId;
use crate::processors::{Batcher, Processor};

mod transfer;
pub mod update;

pub use update::Update;

pub struct Link {
    pub(crate) inlets: RwLock<Vec<Arc<InletNode>>>,
    pub(crate) outlets: RwLock<Vec<Arc<OutletNode>>>,
    pub(crate) processors: Vec<Arc<dyn Processor>>,
    pub(crate) batchers: Vec<Arc<dyn Batcher>>,
    pub(crate) interval: Duration,
    pub(crate) tags: Vec<String>,
    pub(crate) copy_records: bool,
    pub(crate) ignore_exceptions: bool,
    pub(crate) inlet_concurrency: usize,
    pub(crate) immediate_transfer: bool,
    pub(crate) transfer_number: AtomicU64,
    pub(crate) job: Mutex<Option<JobId>>,
}

impl Link {
    pub fn builder() -> LinkBuilder {
        LinkBuilder::new()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn copy_records(&self) -> bool {
        self.copy_records
    }

    pub fn ignore_exceptions(&self) -> bool {
        self.ignore_exceptions
    }

    pub fn inlet_concurrency(&self) -> usize {
        self.inlet_concurrency
    }

    pub fn immediate_transfer(&self) -> bool {
        self.immediate_transfer
    }

    /// Number of transfers started so far.
    pub fn transfer_count(&self) -> u64 {
        self.transfer_number.load(Ordering::SeqCst)
    }

    pub fn inlets(&self) -> Vec<Arc<InletNode>> {
        self.inlets.read().clone()
    }

    pub fn outlets(&self) -> Vec<Arc<OutletNode>> {
        self.outlets.read().clone()
    }

    /// Handle of the scheduler job driving this link, if it is scheduled.
    pub fn job(&self) -> Option<JobId> {
        *self.job.lock()
    }

    pub fn set_job(&self, job: Option<JobId>) {
        *self.job.lock() = job;
    }

    /// Attach more inlets. Nothing is added if any of them is already
    /// attached.
    pub fn add_inlets(
        &self,
        inlets: impl IntoIterator<Item = Arc<InletNode>>,
    ) -> Result<(), LinkError> {
        let incoming: Vec<_> = inlets.into_iter().collect();
        let mut current = self.inlets.write();
        if let Some(dup) = first_duplicate(&current, &incoming) {
            return Err(LinkError::DuplicateInlet(dup.name().to_string()));
        }
        current.extend(incoming);
        Ok(())
    }

    /// Detach inlets. Nothing is removed if any of them is not attached.
    pub fn remove_inlets(&self, inlets: &[Arc<InletNode>]) -> Result<(), LinkError> {
        let mut current = self.inlets.write();
        if let Some(missing) = first_missing(&current, inlets) {
            return Err(LinkError::MissingInlet(missing.name().to_string()));
        }
        current.retain(|known| !inlets.iter().any(|gone| Arc::ptr_eq(known, gone)));
        Ok(())
    }

    /// Attach more outlets. Nothing is added if any of them is already
    /// attached.
    pub fn add_outlets(
        &self,
        outlets: impl IntoIterator<Item = Arc<OutletNode>>,
    ) -> Result<(), LinkError> {
        let incoming: Vec<_> = outlets.into_iter().collect();
        let mut current = self.outlets.write();
        if let Some(dup) = first_duplicate(&current, &incoming) {
            return Err(LinkError::DuplicateOutlet(dup.name().to_string()));
        }
        current.extend(incoming);
        Ok(())
    }

    /// Detach outlets. Nothing is removed if any of them is not attached.
    pub fn remove_outlets(&self, outlets: &[Arc<OutletNode>]) -> Result<(), LinkError> {
        let mut current = self.outlets.write();
        if let Some(missing) = first_missing(&current, outlets) {
            return Err(LinkError::MissingOutlet(missing.name().to_string()));
        }
        current.retain(|known| !outlets.iter().any(|gone| Arc::ptr_eq(known, gone)));
        Ok(())
    }

    /// Start every inlet, then every outlet. Nodes that are already active
    /// are skipped.
    pub fn on_start(&self) -> Result<(), TransferError> {
        let inlets = self.inlets();
        for inlet in &inlets {
            if let Err(source) = inlet.try_start() {
                self.hook_failed(Stage::Start, inlet.name(), source)?;
            }
        }
        let outlets = self.outlets();
        for outlet in &outlets {
            if let Err(source) = outlet.try_start() {
                self.hook_failed(Stage::Start, outlet.name(), source)?;
            }
        }
        Ok(())
    }

    /// Shut every inlet down, then every outlet. Nodes that are already
    /// inactive are skipped.
    pub fn on_shutdown(&self) -> Result<(), TransferError> {
        let inlets = self.inlets();
        for inlet in &inlets {
            if let Err(source) = inlet.try_shutdown() {
                self.hook_failed(Stage::Shutdown, inlet.name(), source)?;
            }
        }
        let outlets = self.outlets();
        for outlet in &outlets {
            if let Err(source) = outlet.try_shutdown() {
                self.hook_failed(Stage::Shutdown, outlet.name(), source)?;
            }
        }
        Ok(())
    }

    fn hook_failed(&self, stage: Stage, node: &str, source: BoxError) -> Result<(), TransferError> {
        let error = TransferError::node(stage, node, self.to_string(), source);
        self.isolate(error, ())
    }

    /// Under the ignore policy a failed node is logged and `fallback` takes
    /// its place. Otherwise the error propagates.
    pub(crate) fn isolate<T>(&self, error: TransferError, fallback: T) -> Result<T, TransferError> {
        if !self.ignore_exceptions {
            return Err(error);
        }
        tracing::error!(link = %self, %error, "ignoring node failure");
        Ok(fallback)
    }

    pub(crate) fn label(&self) -> String {
        if self.tags.is_empty() {
            "untagged".to_string()
        } else {
            self.tags.join(".")
        }
    }
}

fn first_duplicate<'a, T>(current: &[Arc<T>], incoming: &'a [Arc<T>]) -> Option<&'a Arc<T>> {
    incoming.iter().enumerate().find_map(|(i, node)| {
        let seen = current
            .iter()
            .chain(&incoming[..i])
            .any(|known| Arc::ptr_eq(known, node));
        seen.then_some(node)
    })
}

fn first_missing<'a, T>(current: &[Arc<T>], removing: &'a [Arc<T>]) -> Option<&'a Arc<T>> {
    removing
        .iter()
        .find(|node| !current.iter().any(|known| Arc::ptr_eq(known, node)))
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inlets: Vec<String> = self.inlets.read().iter().map(|n| n.name().to_string()).collect();
        let outlets: Vec<String> = self.outlets.read().iter().map(|n| n.name().to_string()).collect();
        write!(
            f,
            "Link(tags: [{}], interval: {:?}, inlets: [{}], outlets: [{}])",
            self.tags.join(", "),
            self.interval,
            inlets.join(", "),
            outlets.join(", ")
        )
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("tags", &self.tags)
            .field("interval", &self.interval)
            .field("inlets", &*self.inlets.read())
            .field("outlets", &*self.outlets.read())
            .field("copy_records", &self.copy_records)
            .field("ignore_exceptions", &self.ignore_exceptions)
            .field("inlet_concurrency", &self.inlet_concurrency)
            .field("immediate_transfer", &self.immediate_transfer)
            .field("job", &self.job())
            .finish()
    }
}
