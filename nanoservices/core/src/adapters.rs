//! Convenience helpers for turning plain closures into inlets and outlets.
//!
//! `inlet_fn` and `outlet_fn` wrap quick synchronous closures. Use
//! `blocking_inlet` and `blocking_outlet` when the closure blocks (file or
//! socket IO, sleeps): it then runs on the runtime's blocking pool and does
//! not stall the sibling pulls or pushes of the same transfer.

use std::sync::Arc;

use async_trait::async_trait;
use relay_utils::{Batch, BoxError, Metadata};
use tokio::task;

use crate::inlets::{Inlet, Pulled};
use crate::link::Update;
use crate::outlets::Outlet;

/// Inlet backed by a closure. See [`inlet_fn`] and [`blocking_inlet`].
pub struct FnInlet<F> {
    name: String,
    metadata: Option<Metadata>,
    blocking: bool,
    f: Arc<F>,
}

impl<F> FnInlet<F> {
    /// Global metadata attached to every record this inlet creates.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Wrap a synchronous closure into an inlet.
///
/// ```no_run
/// use relay_core::adapters::inlet_fn;
/// use serde_json::json;
///
/// let clock = inlet_fn("clock", |update| Ok(json!(update.transfer_number()).into()));
/// ```
pub fn inlet_fn<F>(name: impl Into<String>, f: F) -> FnInlet<F>
where
    F: Fn(&Update) -> Result<Pulled, BoxError> + Send + Sync + 'static,
{
    FnInlet {
        name: name.into(),
        metadata: None,
        blocking: false,
        f: Arc::new(f),
    }
}

/// Wrap a blocking closure into an inlet that pulls on a blocking thread.
pub fn blocking_inlet<F>(name: impl Into<String>, f: F) -> FnInlet<F>
where
    F: Fn(&Update) -> Result<Pulled, BoxError> + Send + Sync + 'static,
{
    FnInlet {
        blocking: true,
        ..inlet_fn(name, f)
    }
}

#[async_trait]
impl<F> Inlet for FnInlet<F>
where
    F: Fn(&Update) -> Result<Pulled, BoxError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    async fn pull(&self, update: &Update) -> Result<Pulled, BoxError> {
        if !self.blocking {
            return (self.f)(update);
        }
        let f = self.f.clone();
        let update = update.clone();
        task::spawn_blocking(move || f(&update)).await?
    }
}

/// Outlet backed by a closure. See [`outlet_fn`] and [`blocking_outlet`].
pub struct FnOutlet<F> {
    name: String,
    blocking: bool,
    f: Arc<F>,
}

/// Wrap a synchronous closure into an outlet.
pub fn outlet_fn<F>(name: impl Into<String>, f: F) -> FnOutlet<F>
where
    F: Fn(Batch, &Update) -> Result<(), BoxError> + Send + Sync + 'static,
{
    FnOutlet {
        name: name.into(),
        blocking: false,
        f: Arc::new(f),
    }
}

/// Wrap a blocking closure into an outlet that pushes on a blocking thread.
pub fn blocking_outlet<F>(name: impl Into<String>, f: F) -> FnOutlet<F>
where
    F: Fn(Batch, &Update) -> Result<(), BoxError> + Send + Sync + 'static,
{
    FnOutlet {
        blocking: true,
        ..outlet_fn(name, f)
    }
}

#[async_trait]
impl<F> Outlet for FnOutlet<F>
where
    F: Fn(Batch, &Update) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn push(&self, records: Batch, update: &Update) -> Result<(), BoxError> {
        if !self.blocking {
            return (self.f)(records, update);
        }
        let f = self.f.clone();
        let update = update.clone();
        task::spawn_blocking(move || f(records, &update)).await?
    }
}
