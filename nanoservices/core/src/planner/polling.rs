use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use relay_utils::{PlannerError, TransferError};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use super::pool::{run_transfer, Signal, WorkerPool};
use super::{ExceptionSink, JobId, Scheduler, DEFAULT_THREADS};
use crate::link::Link;

/// Default tick of the polling loop.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

struct Job {
    id: JobId,
    link: Arc<Link>,
    next_run: Instant,
}

type Failures = Arc<Mutex<Vec<(Arc<Link>, TransferError)>>>;

/// Scheduler polling for due links once per refresh tick.
///
/// Every tick submits each due link to the worker pool, then replays the
/// failures collected from the workers on the loop thread. A link is due
/// `interval` after it was last submitted, so the effective period is
/// rounded up to the next tick. Links with an interval shorter than the
/// refresh tick are rejected.
pub struct PollingScheduler {
    pool: WorkerPool,
    refresh_interval: Duration,
    jobs: Mutex<Vec<Job>>,
    failures: Failures,
}

impl Default for PollingScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_THREADS, DEFAULT_REFRESH_INTERVAL)
    }
}

impl PollingScheduler {
    /// A zero `refresh_interval` is raised to one millisecond.
    pub fn new(threads: usize, refresh_interval: Duration) -> Self {
        Self {
            pool: WorkerPool::new("relay-polling", threads),
            refresh_interval: refresh_interval.max(Duration::from_millis(1)),
            jobs: Mutex::new(Vec::new()),
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn threads(&self) -> usize {
        self.pool.threads()
    }

    fn run_pending(&self, in_flight: &mut JoinSet<()>) {
        let now = Instant::now();
        let mut jobs = self.jobs.lock();
        for job in jobs.iter_mut().filter(|job| job.next_run <= now) {
            job.next_run = now + job.link.interval();
            let link = job.link.clone();
            let failures = self.failures.clone();
            in_flight.spawn_blocking(move || {
                let (link, result) = run_transfer(link);
                if let Err(error) = result {
                    failures.lock().push((link, error));
                }
            });
        }
    }

    fn replay_failures(&self, on_exception: &ExceptionSink<'_>) {
        let failed = std::mem::take(&mut *self.failures.lock());
        for (link, error) in failed {
            on_exception(error, &link);
        }
    }

    async fn event_loop(
        &self,
        mut signal: watch::Receiver<Signal>,
        on_exception: &ExceptionSink<'_>,
    ) -> bool {
        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight = JoinSet::new();

        let drain = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_pending(&mut in_flight);
                    self.replay_failures(on_exception);
                }

                Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(error) = done {
                        tracing::error!(%error, "transfer task did not complete");
                    }
                }

                wait = Signal::stopped(&mut signal) => break wait,
            }
        };

        if drain {
            while in_flight.join_next().await.is_some() {}
            self.replay_failures(on_exception);
        } else {
            in_flight.detach_all();
        }
        drain
    }
}

impl Scheduler for PollingScheduler {
    fn schedule(&self, link: &Arc<Link>) -> Result<JobId, PlannerError> {
        if link.interval() < self.refresh_interval {
            return Err(PlannerError::ScheduleInterval {
                interval: link.interval(),
                refresh: self.refresh_interval,
            });
        }
        let id = JobId::new();
        self.jobs.lock().push(Job {
            id,
            link: link.clone(),
            next_run: Instant::now() + link.interval(),
        });
        Ok(id)
    }

    fn unschedule(&self, link: &Link) {
        if let Some(id) = link.job() {
            self.jobs.lock().retain(|job| job.id != id);
        }
    }

    fn start(&self, on_exception: &ExceptionSink<'_>) -> Result<(), PlannerError> {
        self.pool
            .run(|signal| self.event_loop(signal, on_exception))
    }

    fn shutdown(&self, wait: bool) {
        self.pool.stop(wait);
    }

    fn running(&self) -> bool {
        self.pool.is_running()
    }
}

impl fmt::Display for PollingScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PollingScheduler(threads: {}, refresh_interval: {:?})",
            self.pool.threads(),
            self.refresh_interval
        )
    }
}
