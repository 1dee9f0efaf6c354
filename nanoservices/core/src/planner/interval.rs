use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use relay_utils::{PlannerError, TransferError};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

use super::pool::{run_transfer, settle, Signal, WorkerPool};
use super::{ExceptionSink, JobId, Scheduler, DEFAULT_THREADS};
use crate::events::bus::TriggerBus;
use crate::events::interval::spawn_interval_trigger;
use crate::events::trigger::TriggerEvent;
use crate::link::Link;

struct Job {
    link: Arc<Link>,
    trigger: Option<JoinHandle<()>>,
}

/// Channels of the running loop that new jobs are wired to.
struct Live {
    handle: Handle,
    events: mpsc::Sender<TriggerEvent>,
    paused: watch::Sender<bool>,
}

impl Live {
    fn arm(&self, id: JobId, link: &Link) -> JoinHandle<()> {
        spawn_interval_trigger(
            &self.handle,
            id,
            link.interval(),
            self.paused.subscribe(),
            self.events.clone(),
        )
    }
}

#[derive(Default)]
struct Registry {
    jobs: HashMap<JobId, Job>,
    live: Option<Live>,
}

/// Scheduler giving every link its own timer.
///
/// Each scheduled link gets an interval trigger firing one interval after
/// it was armed, then every interval. A fired trigger runs the link's
/// transfer on the worker pool. Scheduling can be paused and resumed while
/// running.
pub struct IntervalScheduler {
    pool: WorkerPool,
    registry: Mutex<Registry>,
}

impl Default for IntervalScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_THREADS)
    }
}

impl IntervalScheduler {
    pub fn new(threads: usize) -> Self {
        Self {
            pool: WorkerPool::new("relay-interval", threads),
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn threads(&self) -> usize {
        self.pool.threads()
    }

    /// Triggers keep ticking but fire nothing until resumed.
    pub fn pause(&self) -> Result<(), PlannerError> {
        self.set_paused(true)
    }

    pub fn resume(&self) -> Result<(), PlannerError> {
        self.set_paused(false)
    }

    pub fn paused(&self) -> bool {
        self.registry
            .lock()
            .live
            .as_ref()
            .is_some_and(|live| *live.paused.borrow())
    }

    fn set_paused(&self, paused: bool) -> Result<(), PlannerError> {
        let registry = self.registry.lock();
        match &registry.live {
            Some(live) if self.pool.is_running() => {
                live.paused.send_replace(paused);
                tracing::info!(paused, "interval scheduler toggled");
                Ok(())
            }
            _ => Err(PlannerError::NotRunning),
        }
    }

    fn link_of(&self, job: JobId) -> Option<Arc<Link>> {
        self.registry.lock().jobs.get(&job).map(|job| job.link.clone())
    }

    async fn event_loop(
        &self,
        mut signal: watch::Receiver<Signal>,
        on_exception: &ExceptionSink<'_>,
    ) -> bool {
        let mut bus = TriggerBus::new();
        {
            let mut registry = self.registry.lock();
            let (paused, _) = watch::channel(false);
            let live = Live {
                handle: Handle::current(),
                events: bus.publisher(),
                paused,
            };
            for (id, job) in registry.jobs.iter_mut() {
                job.trigger = Some(live.arm(*id, &job.link));
            }
            registry.live = Some(live);
        }

        let mut in_flight: JoinSet<(Arc<Link>, Result<(), TransferError>)> = JoinSet::new();
        let drain = loop {
            tokio::select! {
                Some(event) = bus.next() => {
                    let Some(link) = self.link_of(event.job) else {
                        tracing::warn!(job = %event.job, "trigger fired for unknown job");
                        continue;
                    };
                    tracing::debug!(%link, lag = ?event.fired_at.elapsed(), "trigger fired");
                    in_flight.spawn_blocking(move || run_transfer(link));
                }

                Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                    settle(done, on_exception);
                }

                wait = Signal::stopped(&mut signal) => break wait,
            }
        };

        {
            let mut registry = self.registry.lock();
            registry.live = None;
            for job in registry.jobs.values_mut() {
                if let Some(trigger) = job.trigger.take() {
                    trigger.abort();
                }
            }
        }

        if drain {
            while let Some(done) = in_flight.join_next().await {
                settle(done, on_exception);
            }
        } else {
            in_flight.detach_all();
        }
        drain
    }
}

impl Scheduler for IntervalScheduler {
    fn schedule(&self, link: &Arc<Link>) -> Result<JobId, PlannerError> {
        if link.interval().is_zero() {
            return Err(PlannerError::InvalidInterval {
                link: link.to_string(),
                interval: link.interval(),
            });
        }
        let id = JobId::new();
        let mut registry = self.registry.lock();
        let trigger = registry.live.as_ref().map(|live| live.arm(id, link));
        registry.jobs.insert(
            id,
            Job {
                link: link.clone(),
                trigger,
            },
        );
        Ok(id)
    }

    fn unschedule(&self, link: &Link) {
        let Some(id) = link.job() else { return };
        if let Some(job) = self.registry.lock().jobs.remove(&id) {
            if let Some(trigger) = job.trigger {
                trigger.abort();
            }
        }
    }

    fn start(&self, on_exception: &ExceptionSink<'_>) -> Result<(), PlannerError> {
        self.pool
            .run(|signal| self.event_loop(signal, on_exception))
    }

    fn shutdown(&self, wait: bool) {
        self.pool.stop(wait);
    }

    /// False while paused.
    fn running(&self) -> bool {
        self.pool.is_running() && !self.paused()
    }

    fn started(&self) -> bool {
        self.pool.is_running()
    }
}

impl fmt::Display for IntervalScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntervalScheduler(threads: {})", self.pool.threads())
    }
}
