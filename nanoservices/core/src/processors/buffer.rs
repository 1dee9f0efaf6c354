//! Stateful processor that withholds records until a release condition holds.
//!
//! A [`Buffer`] accumulates records across transfers. On every call it adds
//! the incoming records to its store and evaluates its controllers against
//! the whole store: custom controllers first, then the count controller,
//! then the time controller. With conjunction all controllers must pass,
//! otherwise any single one suffices. A controller that fails is logged and
//! skipped. When the buffer releases, it hands back everything it carries
//! and resets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relay_utils::{BoxError, Record};

use super::traits::Processor;

/// A release predicate evaluated against every record the buffer carries.
pub trait Controller: Send + Sync {
    fn evaluate(&self, records: &[Record]) -> Result<bool, BoxError>;
}

impl<F> Controller for F
where
    F: Fn(&[Record]) -> Result<bool, BoxError> + Send + Sync,
{
    fn evaluate(&self, records: &[Record]) -> Result<bool, BoxError> {
        self(records)
    }
}

#[derive(Default)]
struct Store {
    records: Vec<Record>,
    time_start: Option<Instant>,
}

#[derive(Default)]
pub struct Buffer {
    count_threshold: Option<usize>,
    time_threshold: Option<Duration>,
    controllers: Vec<Box<dyn Controller>>,
    conjunction: bool,
    on_reset: Option<Box<dyn Fn() + Send + Sync>>,
    flush: AtomicBool,
    store: Mutex<Store>,
}

impl Buffer {
    /// A buffer without controllers. With the default disjunction it only
    /// releases when flushed; with conjunction an empty controller set
    /// passes, so it releases on every call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Release once the buffer carries more than `threshold` records.
    pub fn with_count_threshold(mut self, threshold: usize) -> Self {
        self.count_threshold = Some(threshold);
        self
    }

    /// Release once more than `threshold` has passed since the first
    /// evaluation after the last reset.
    pub fn with_time_threshold(mut self, threshold: Duration) -> Self {
        self.time_threshold = Some(threshold);
        self
    }

    pub fn with_controller(mut self, controller: impl Controller + 'static) -> Self {
        self.controllers.push(Box::new(controller));
        self
    }

    /// Require every controller to pass instead of any one.
    pub fn with_conjunction(mut self, conjunction: bool) -> Self {
        self.conjunction = conjunction;
        self
    }

    pub fn on_reset(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_reset = Some(Box::new(callback));
        self
    }

    /// Force a release on the next evaluation regardless of controllers.
    pub fn flush(&self) {
        self.flush.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.store.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every carried record, restarts the time controller and clears
    /// the flush flag.
    pub fn reset(&self) {
        {
            let mut store = self.store.lock();
            store.records.clear();
            store.time_start = None;
            self.flush.store(false, Ordering::SeqCst);
        }
        self.notify_reset();
    }

    /// Adds `records` to the store and returns everything carried if the
    /// buffer releases, or an empty list otherwise.
    ///
    /// Releasing empties the store, restarts the time controller and
    /// consumes the flush flag under one lock, so records and flushes from
    /// concurrent callers land either in this release or in a later one.
    pub fn execute(&self, records: Vec<Record>) -> Vec<Record> {
        let released = {
            let mut store = self.store.lock();
            store.records.extend(records);

            let flushing = self.flush.swap(false, Ordering::SeqCst);
            let release = flushing || self.should_release(&mut store);
            if !release || store.records.is_empty() {
                if flushing {
                    // nothing to flush yet, keep the request for the next call
                    self.flush.store(true, Ordering::SeqCst);
                }
                return Vec::new();
            }
            store.time_start = None;
            std::mem::take(&mut store.records)
        };

        self.notify_reset();
        released
    }

    fn notify_reset(&self) {
        if let Some(callback) = &self.on_reset {
            callback();
        }
    }

    fn should_release(&self, store: &mut Store) -> bool {
        let Store {
            records,
            time_start,
        } = store;
        let records: &[Record] = records;

        let custom = self
            .controllers
            .iter()
            .map(|controller| controller.evaluate(records));
        let count = self
            .count_threshold
            .into_iter()
            .map(|threshold| Ok(records.len() > threshold));
        let time = self.time_threshold.into_iter().map(|threshold| {
            let started = *time_start.get_or_insert_with(Instant::now);
            Ok(started.elapsed() > threshold)
        });

        let mut verdicts = custom
            .chain(count)
            .chain(time)
            .filter_map(|verdict: Result<bool, BoxError>| match verdict {
                Ok(passed) => Some(passed),
                Err(error) => {
                    tracing::error!(%error, "buffer controller failed, skipping it");
                    None
                }
            });

        if self.conjunction {
            verdicts.all(|passed| passed)
        } else {
            verdicts.any(|passed| passed)
        }
    }
}

impl Processor for Buffer {
    fn name(&self) -> &str {
        "buffer"
    }

    fn process(&self, records: Vec<Record>) -> Result<Vec<Record>, BoxError> {
        Ok(self.execute(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn records(values: &[&str]) -> Vec<Record> {
        values.iter().map(|v| Record::from_payload(json!(v))).collect()
    }

    fn payloads(records: &[Record]) -> Vec<String> {
        records
            .iter()
            .filter_map(|r| r.payload().as_str().map(str::to_string))
            .collect()
    }

    #[test]
    fn count_threshold_releases_above_threshold() {
        let buffer = Buffer::new().with_count_threshold(3);

        assert!(buffer.execute(records(&["a", "b"])).is_empty());
        assert_eq!(buffer.len(), 2);

        let released = buffer.execute(records(&["c", "d"]));
        assert_eq!(payloads(&released), vec!["a", "b", "c", "d"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn count_threshold_is_strictly_greater() {
        let buffer = Buffer::new().with_count_threshold(2);
        assert!(buffer.execute(records(&["a", "b"])).is_empty());
        assert_eq!(buffer.execute(records(&["c"])).len(), 3);
    }

    #[test]
    fn time_threshold_starts_on_first_evaluation() {
        let buffer = Buffer::new().with_time_threshold(Duration::from_millis(30));

        assert!(buffer.execute(records(&["a"])).is_empty());
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(buffer.execute(records(&["b"])).len(), 2);

        // clock restarts after the release
        assert!(buffer.execute(records(&["c"])).is_empty());
    }

    #[test]
    fn conjunction_needs_every_controller() {
        let buffer = Buffer::new()
            .with_count_threshold(1)
            .with_time_threshold(Duration::from_secs(60))
            .with_conjunction(true);

        assert!(buffer.execute(records(&["a", "b", "c"])).is_empty());
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn disjunction_needs_any_controller() {
        let buffer = Buffer::new()
            .with_count_threshold(1)
            .with_time_threshold(Duration::from_secs(60));

        assert_eq!(buffer.execute(records(&["a", "b"])).len(), 2);
    }

    #[test]
    fn flush_forces_release_and_clears_flag() {
        let buffer = Buffer::new().with_count_threshold(100);
        buffer.execute(records(&["a"]));
        buffer.flush();

        assert_eq!(buffer.execute(records(&["b"])).len(), 2);
        assert!(buffer.execute(records(&["c"])).is_empty());
    }

    #[test]
    fn failing_controller_is_skipped() {
        let buffer = Buffer::new()
            .with_controller(|_: &[Record]| -> Result<bool, BoxError> { Err("broken".into()) })
            .with_count_threshold(1);

        assert!(buffer.execute(records(&["a"])).is_empty());
        assert_eq!(buffer.execute(records(&["b"])).len(), 2);
    }

    #[test]
    fn custom_controller_sees_whole_store() {
        let buffer = Buffer::new().with_controller(|records: &[Record]| -> Result<bool, BoxError> {
            Ok(records.iter().any(|r| r.payload() == "end"))
        });

        assert!(buffer.execute(records(&["a"])).is_empty());
        assert_eq!(
            payloads(&buffer.execute(records(&["b", "end"]))),
            vec!["a", "b", "end"]
        );
    }

    #[test]
    fn conjunction_without_controllers_releases_every_call() {
        let buffer = Buffer::new().with_conjunction(true);
        assert_eq!(buffer.execute(records(&["a"])).len(), 1);
        assert_eq!(buffer.execute(records(&["b"])).len(), 1);

        let plain = Buffer::new();
        assert!(plain.execute(records(&["a"])).is_empty());
        assert_eq!(plain.len(), 1);
    }

    #[test]
    fn flush_on_empty_store_waits_for_records() {
        let buffer = Buffer::new();
        buffer.flush();

        assert!(buffer.execute(Vec::new()).is_empty());
        assert_eq!(payloads(&buffer.execute(records(&["a"]))), vec!["a"]);
        assert!(buffer.execute(records(&["b"])).is_empty());
    }

    #[test]
    fn shared_buffer_keeps_every_record_across_threads() {
        const THREADS: usize = 8;
        const CALLS: usize = 5_000;

        let buffer = Arc::new(Buffer::new().with_count_threshold(5));
        let released = Arc::new(AtomicUsize::new(0));
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let buffer = buffer.clone();
                let released = released.clone();
                std::thread::spawn(move || {
                    for _ in 0..CALLS {
                        let out = buffer.execute(records(&["x"]));
                        released.fetch_add(out.len(), Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(
            released.load(Ordering::SeqCst) + buffer.len(),
            THREADS * CALLS
        );
    }

    #[test]
    fn concurrent_flush_is_not_lost() {
        let buffer = Arc::new(Buffer::new().with_count_threshold(1_000_000));
        let feeder = {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                for _ in 0..2_000 {
                    buffer.execute(records(&["x"]));
                }
            })
        };
        for _ in 0..200 {
            buffer.flush();
            std::thread::yield_now();
        }
        feeder.join().unwrap();

        // the last flush either released already or is still pending
        buffer.flush();
        buffer.execute(Vec::new());
        assert!(buffer.is_empty());
    }

    #[test]
    fn on_reset_fires_on_release_and_manual_reset() {
        let resets = Arc::new(AtomicUsize::new(0));
        let counter = resets.clone();
        let buffer = Buffer::new()
            .with_count_threshold(0)
            .on_reset(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        buffer.execute(records(&["a"]));
        buffer.reset();
        assert_eq!(resets.load(Ordering::SeqCst), 2);
    }
}
