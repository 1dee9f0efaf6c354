//! Link registry and lifecycle on top of a pluggable scheduler.
//!
//! A [`Planner`] owns a set of links and hands each of them to its
//! [`Scheduler`] backend, which runs `Link::transfer` on a worker thread
//! every `interval`. Two backends ship with the crate:
//! [`IntervalScheduler`] (one timer per link, can pause) and
//! [`PollingScheduler`] (one loop polling for due links every refresh tick).
//!
//! `Planner::start` blocks its caller until the planner is shut down, so it
//! is usually run on a dedicated thread:
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use relay_core::inlets::NullInlet;
//! use relay_core::link::Link;
//! use relay_core::outlets::PrintOutlet;
//! use relay_core::planner::Planner;
//!
//! let link = Link::builder()
//!     .interval(Duration::from_secs(2))
//!     .inlet(NullInlet)
//!     .outlet(PrintOutlet::new())
//!     .build()
//!     .unwrap();
//!
//! let planner = Arc::new(Planner::interval(4));
//! planner.add_links([link]).unwrap();
//!
//! let runner = planner.clone();
//! let handle = std::thread::spawn(move || runner.start());
//! std::thread::sleep(Duration::from_secs(10));
//! planner.shutdown(true);
//! handle.join().unwrap().unwrap();
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use relay_utils::{PlannerError, TransferError};
use tokio::sync::watch;
use uuid::Uuid;

use crate::link::Link;

pub mod interval;
pub mod polling;
mod pool;

pub use interval::IntervalScheduler;
pub use polling::PollingScheduler;

pub type IntervalPlanner = Planner<IntervalScheduler>;
pub type PollingPlanner = Planner<PollingScheduler>;

/// Default size of a scheduler's worker pool.
pub const DEFAULT_THREADS: usize = 30;

/// Handle the scheduler hands back for a scheduled link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Receives the failure of a scheduled transfer together with its link.
pub type ExceptionSink<'a> = dyn Fn(TransferError, &Arc<Link>) + Sync + 'a;

/// A backend that runs link transfers periodically on a worker pool.
pub trait Scheduler: fmt::Display + Send + Sync + 'static {
    /// Start running `link` every `link.interval()`. Works whether or not
    /// the scheduler is running.
    fn schedule(&self, link: &Arc<Link>) -> Result<JobId, PlannerError>;

    /// Stop running `link`. Unknown links are ignored.
    fn unschedule(&self, link: &Link);

    /// Run scheduled transfers until `shutdown` is called. Blocks the
    /// caller. Failed transfers are reported to `on_exception` from the
    /// calling thread.
    fn start(&self, on_exception: &ExceptionSink<'_>) -> Result<(), PlannerError>;

    /// Stop scheduling. With `wait`, block until in-flight transfers
    /// finished; otherwise they are detached and their outcome discarded.
    fn shutdown(&self, wait: bool);

    fn running(&self) -> bool;

    /// True from the moment the loop is up until it stops, whether or not
    /// it currently fires transfers.
    fn started(&self) -> bool {
        self.running()
    }
}

/// What the interrupt watcher does on Ctrl-C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupt {
    /// Shut the planner down gracefully and let `start` return.
    Shutdown,
    /// Nothing is left to stop; end the process like an unhandled SIGINT.
    Exit,
}

/// Exit status of a process ended by SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

type Observer = Box<dyn Fn(&PlannerError) + Send + Sync>;

pub struct Planner<S: Scheduler> {
    scheduler: S,
    links: Mutex<Vec<Arc<Link>>>,
    ignore_exceptions: bool,
    immediate_transfer: bool,
    shutdown_at_exit: bool,
    observer: Option<Observer>,
    exit_hook: Mutex<Option<watch::Sender<()>>>,
}

impl Planner<IntervalScheduler> {
    pub fn interval(threads: usize) -> Self {
        Planner::new(IntervalScheduler::new(threads))
    }

    /// Stop firing scheduled transfers without shutting down.
    pub fn pause(&self) -> Result<(), PlannerError> {
        self.scheduler.pause()
    }

    pub fn resume(&self) -> Result<(), PlannerError> {
        self.scheduler.resume()
    }

    pub fn paused(&self) -> bool {
        self.scheduler.paused()
    }
}

impl Planner<PollingScheduler> {
    pub fn polling(threads: usize, refresh_interval: std::time::Duration) -> Self {
        Planner::new(PollingScheduler::new(threads, refresh_interval))
    }

    pub fn refresh_interval(&self) -> std::time::Duration {
        self.scheduler.refresh_interval()
    }
}

impl<S: Scheduler> Planner<S> {
    pub fn new(scheduler: S) -> Self {
        Self {
            scheduler,
            links: Mutex::new(Vec::new()),
            ignore_exceptions: false,
            immediate_transfer: true,
            shutdown_at_exit: false,
            observer: None,
            exit_hook: Mutex::new(None),
        }
    }

    /// Keep running after a failed transfer instead of shutting down.
    pub fn with_ignore_exceptions(mut self, ignore_exceptions: bool) -> Self {
        self.ignore_exceptions = ignore_exceptions;
        self
    }

    /// Transfer every opted-in link once when the planner starts.
    pub fn with_immediate_transfer(mut self, immediate_transfer: bool) -> Self {
        self.immediate_transfer = immediate_transfer;
        self
    }

    /// Shut down gracefully when the process receives Ctrl-C.
    ///
    /// Once armed, the interrupt is handled by the planner for the rest of
    /// the process lifetime and no longer terminates it on its own.
    pub fn with_shutdown_at_exit(mut self, shutdown_at_exit: bool) -> Self {
        self.shutdown_at_exit = shutdown_at_exit;
        self
    }

    /// Called with every error routed through [`Planner::on_exception`].
    pub fn with_exception_observer(
        mut self,
        observer: impl Fn(&PlannerError) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn ignore_exceptions(&self) -> bool {
        self.ignore_exceptions
    }

    pub fn immediate_transfer(&self) -> bool {
        self.immediate_transfer
    }

    pub fn shutdown_at_exit(&self) -> bool {
        self.shutdown_at_exit
    }

    pub fn running(&self) -> bool {
        self.scheduler.running()
    }

    /// Snapshot of the registered links.
    pub fn links(&self) -> Vec<Arc<Link>> {
        self.links.lock().clone()
    }

    /// Register and schedule links, in order. Stops at the first link that
    /// is already registered or that the scheduler rejects; links before it
    /// stay registered.
    pub fn add_links(&self, links: impl IntoIterator<Item = Arc<Link>>) -> Result<(), PlannerError> {
        for link in links {
            let mut registry = self.links.lock();
            if registry.iter().any(|known| Arc::ptr_eq(known, &link)) {
                return Err(PlannerError::DuplicateLink(link.to_string()));
            }
            let job = self.scheduler.schedule(&link)?;
            link.set_job(Some(job));
            tracing::info!(%link, %job, "link added");
            registry.push(link);
        }
        Ok(())
    }

    /// Unschedule and unregister links. Nothing is removed if any of them
    /// is not registered.
    pub fn remove_links(&self, links: &[Arc<Link>]) -> Result<(), PlannerError> {
        let mut registry = self.links.lock();
        if let Some(missing) = links
            .iter()
            .find(|link| !registry.iter().any(|known| Arc::ptr_eq(known, link)))
        {
            return Err(PlannerError::MissingLink(missing.to_string()));
        }
        for link in links {
            self.release(link);
        }
        registry.retain(|known| !links.iter().any(|gone| Arc::ptr_eq(known, gone)));
        Ok(())
    }

    /// Unschedule and unregister every link.
    pub fn purge(&self) {
        let mut registry = self.links.lock();
        for link in registry.iter() {
            self.release(link);
        }
        registry.clear();
        tracing::info!("planner purged");
    }

    fn release(&self, link: &Link) {
        if link.job().is_some() {
            self.scheduler.unschedule(link);
        }
        link.set_job(None);
    }

    /// Start every node, run the immediate transfers, then block running
    /// the scheduler until [`Planner::shutdown`] is called.
    ///
    /// If an immediate transfer fails and exceptions are not ignored, the
    /// failure is routed through [`Planner::on_exception`] and `start`
    /// returns without starting the scheduler.
    ///
    /// Calling `start` on a started planner returns `Ok(())` right away.
    /// A `shutdown` issued before the scheduler loop is up (while nodes
    /// start or immediate transfers run) is not remembered: the loop still
    /// starts afterwards and needs another `shutdown`.
    pub fn start(self: &Arc<Self>) -> Result<(), PlannerError> {
        if self.scheduler.started() {
            tracing::debug!(planner = %self, "planner already started");
            return Ok(());
        }
        tracing::info!(planner = %self, "starting planner");
        let links = self.links();

        for link in &links {
            if let Err(error) = link.on_start() {
                self.on_exception(error, link);
            }
        }

        if self.immediate_transfer {
            for link in links.iter().filter(|link| link.immediate_transfer()) {
                if let Err(error) = link.transfer() {
                    self.on_exception(error, link);
                    if !self.ignore_exceptions {
                        return Ok(());
                    }
                }
            }
        }

        if self.shutdown_at_exit {
            self.arm_exit_hook();
        }

        self.scheduler
            .start(&|error, link| self.on_exception(error, link))
    }

    /// Stop the scheduler, then shut every link's nodes down.
    ///
    /// With `wait`, blocks until in-flight transfers finished. Without it,
    /// they are detached and their outcome is discarded.
    pub fn shutdown(&self, wait: bool) {
        tracing::info!(planner = %self, wait, "shutting down planner");
        self.exit_hook.lock().take();
        self.scheduler.shutdown(wait);

        for link in self.links() {
            if let Err(error) = link.on_shutdown() {
                self.report(PlannerError::Transfer {
                    link: link.to_string(),
                    source: error,
                });
            }
        }
    }

    /// Transfer every registered link once on the calling thread.
    pub fn force_transfer(&self) {
        for link in self.links() {
            if let Err(error) = link.transfer() {
                self.on_exception(error, &link);
            }
        }
    }

    /// Log a failure of `link`, pass it to the observer and, unless
    /// exceptions are ignored, shut down a running planner without waiting.
    pub fn on_exception(&self, error: TransferError, link: &Link) {
        self.report(PlannerError::Transfer {
            link: link.to_string(),
            source: error,
        });
        if !self.ignore_exceptions && self.running() {
            self.shutdown(false);
        }
    }

    fn report(&self, error: PlannerError) {
        tracing::error!(%error, "link failed");
        if let Some(observer) = &self.observer {
            observer(&error);
        }
    }

    /// Handles Ctrl-C for an armed planner. A started scheduler is shut
    /// down even while paused; otherwise the caller has to end the process,
    /// since the watcher replaced the default interrupt handling.
    pub(crate) fn on_interrupt(&self) -> Interrupt {
        if !self.scheduler.started() {
            return Interrupt::Exit;
        }
        tracing::info!("interrupted, shutting planner down gracefully");
        self.shutdown(true);
        Interrupt::Shutdown
    }

    fn arm_exit_hook(self: &Arc<Self>) {
        let (disarm, mut disarmed) = watch::channel(());
        *self.exit_hook.lock() = Some(disarm);
        let planner: Weak<Self> = Arc::downgrade(self);

        let spawned = std::thread::Builder::new()
            .name("relay-exit-hook".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(error) => {
                        tracing::warn!(%error, "cannot watch for interrupts");
                        return;
                    }
                };
                let interrupted = runtime.block_on(async move {
                    tokio::select! {
                        signal = tokio::signal::ctrl_c() => signal.is_ok(),
                        _ = disarmed.changed() => false,
                    }
                });
                if !interrupted {
                    return;
                }
                let action = planner
                    .upgrade()
                    .map_or(Interrupt::Exit, |planner| planner.on_interrupt());
                if action == Interrupt::Exit {
                    tracing::warn!("interrupted with no planner loop to stop, exiting");
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            });
        if let Err(error) = spawned {
            tracing::warn!(%error, "cannot spawn interrupt watcher");
        }
    }
}

impl<S: Scheduler> fmt::Display for Planner<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Planner(scheduler: {}, links: {}, ignore_exceptions: {})",
            self.scheduler,
            self.links.lock().len(),
            self.ignore_exceptions
        )
    }
}
