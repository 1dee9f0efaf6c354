#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::inlets::{Inlet, Pulled};
use relay_core::link::Update;
use relay_core::outlets::Outlet;
use relay_core::planner::{Planner, Scheduler};
use relay_utils::{Batch, BoxError, PlannerError, Record};
use serde_json::json;

/// Counts pulls and lifecycle hooks.
#[derive(Default)]
pub struct Probe {
    pub pulls: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl Probe {
    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

pub struct ProbeInlet {
    pub probe: Arc<Probe>,
    pub fail_pull: bool,
    pub fail_start: bool,
}

impl ProbeInlet {
    pub fn new(probe: Arc<Probe>) -> Self {
        Self {
            probe,
            fail_pull: false,
            fail_start: false,
        }
    }

    pub fn failing(probe: Arc<Probe>) -> Self {
        Self {
            fail_pull: true,
            ..Self::new(probe)
        }
    }
}

#[async_trait]
impl Inlet for ProbeInlet {
    fn name(&self) -> &str {
        "probe"
    }

    async fn pull(&self, update: &Update) -> Result<Pulled, BoxError> {
        self.probe.pulls.fetch_add(1, Ordering::SeqCst);
        if self.fail_pull {
            return Err("probe pull failed".into());
        }
        Ok(json!(update.transfer_number()).into())
    }

    fn on_start(&self) -> Result<(), BoxError> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err("probe refused to start".into());
        }
        Ok(())
    }

    fn on_shutdown(&self) -> Result<(), BoxError> {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Keeps every record it receives. Pushes can be slowed down.
#[derive(Default)]
pub struct Collector {
    pub records: Mutex<Vec<Record>>,
    pub pushes_started: AtomicUsize,
    pub pushes_finished: AtomicUsize,
}

pub struct CollectOutlet {
    pub collector: Arc<Collector>,
    pub delay: Duration,
}

impl CollectOutlet {
    pub fn new(collector: Arc<Collector>) -> Self {
        Self {
            collector,
            delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl Outlet for CollectOutlet {
    fn name(&self) -> &str {
        "collect"
    }

    async fn push(&self, records: Batch, _: &Update) -> Result<(), BoxError> {
        self.collector.pushes_started.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.collector.records.lock().extend(records.iter().cloned());
        self.collector.pushes_finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Collects every error the planner routes through its exception hook.
pub fn observed() -> (Arc<Mutex<Vec<String>>>, impl Fn(&PlannerError) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |error: &PlannerError| sink.lock().push(error.to_string()))
}

pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Runs `planner.start()` on its own thread and waits for it to be running.
pub fn spawn_planner<S: Scheduler>(
    planner: &Arc<Planner<S>>,
) -> JoinHandle<Result<(), PlannerError>> {
    let runner = planner.clone();
    let handle = std::thread::spawn(move || runner.start());
    assert!(
        wait_until(Duration::from_secs(2), || planner.running()),
        "planner did not start"
    );
    handle
}
