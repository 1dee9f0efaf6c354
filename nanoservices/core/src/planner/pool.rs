use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use relay_utils::{PlannerError, TransferError};
use tokio::runtime::{Builder, Handle};
use tokio::sync::watch;
use tokio::task::JoinError;

use crate::link::Link;

/// What a running scheduler loop is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Run,
    Stop { wait: bool },
}

impl Signal {
    /// Resolves once a stop was requested and reports whether the loop must
    /// drain in-flight transfers. A dropped sender counts as a detached stop.
    pub(crate) async fn stopped(rx: &mut watch::Receiver<Signal>) -> bool {
        loop {
            if let Signal::Stop { wait } = *rx.borrow_and_update() {
                return wait;
            }
            if rx.changed().await.is_err() {
                return false;
            }
        }
    }
}

enum PoolState {
    Idle,
    Running {
        handle: Handle,
        signal: watch::Sender<Signal>,
        loop_thread: ThreadId,
    },
    Stopping {
        loop_thread: ThreadId,
    },
}

/// The runtime a scheduler loop runs on.
///
/// `run` blocks the calling thread on a current-thread runtime whose blocking
/// pool, capped at `threads`, executes the transfers. `stop` asks the loop to
/// finish and, with `wait`, blocks until the runtime is gone.
pub(crate) struct WorkerPool {
    name: &'static str,
    threads: usize,
    state: Mutex<PoolState>,
    idle: Condvar,
}

impl WorkerPool {
    pub(crate) fn new(name: &'static str, threads: usize) -> Self {
        Self {
            name,
            threads: threads.max(1),
            state: Mutex::new(PoolState::Idle),
            idle: Condvar::new(),
        }
    }

    pub(crate) fn threads(&self) -> usize {
        self.threads
    }

    pub(crate) fn is_running(&self) -> bool {
        matches!(*self.state.lock(), PoolState::Running { .. })
    }

    /// Handle to the live runtime, if the loop is running.
    pub(crate) fn handle(&self) -> Option<Handle> {
        match &*self.state.lock() {
            PoolState::Running { handle, .. } => Some(handle.clone()),
            _ => None,
        }
    }

    /// Drives `event_loop` until it returns. The loop receives the stop
    /// signal and returns whether in-flight work was drained; if not, the
    /// runtime is shut down in the background and stragglers are detached.
    ///
    /// Returns immediately if the pool is already running.
    pub(crate) fn run<F, Fut>(&self, event_loop: F) -> Result<(), PlannerError>
    where
        F: FnOnce(watch::Receiver<Signal>) -> Fut,
        Fut: Future<Output = bool>,
    {
        let (runtime, signal) = {
            let mut state = self.state.lock();
            if !matches!(*state, PoolState::Idle) {
                tracing::debug!(pool = self.name, "scheduler already running");
                return Ok(());
            }
            let runtime = Builder::new_current_thread()
                .enable_all()
                .max_blocking_threads(self.threads)
                .thread_name(self.name)
                .build()?;
            let (signal, rx) = watch::channel(Signal::Run);
            *state = PoolState::Running {
                handle: runtime.handle().clone(),
                signal,
                loop_thread: thread::current().id(),
            };
            (runtime, rx)
        };

        tracing::info!(pool = self.name, threads = self.threads, "scheduler started");
        let drained = runtime.block_on(event_loop(signal));
        if drained {
            drop(runtime);
        } else {
            runtime.shutdown_background();
        }

        *self.state.lock() = PoolState::Idle;
        self.idle.notify_all();
        tracing::info!(pool = self.name, drained, "scheduler stopped");
        Ok(())
    }

    /// Asks a running loop to stop. With `wait`, blocks until it has fully
    /// stopped, except when called from the loop's own thread.
    pub(crate) fn stop(&self, wait: bool) {
        let mut state = self.state.lock();
        let loop_thread = match &*state {
            PoolState::Idle => return,
            PoolState::Stopping { loop_thread } => *loop_thread,
            PoolState::Running {
                signal,
                loop_thread,
                ..
            } => {
                signal.send_replace(Signal::Stop { wait });
                *loop_thread
            }
        };
        if matches!(*state, PoolState::Running { .. }) {
            *state = PoolState::Stopping { loop_thread };
        }

        if wait && thread::current().id() != loop_thread {
            while !matches!(*state, PoolState::Idle) {
                self.idle.wait(&mut state);
            }
        }
    }
}

/// Runs one transfer on the calling pool thread, turning a panic into an error.
pub(crate) fn run_transfer(link: Arc<Link>) -> (Arc<Link>, Result<(), TransferError>) {
    let result = match catch_unwind(AssertUnwindSafe(|| link.transfer())) {
        Ok(result) => result,
        Err(panic) => Err(TransferError::Panicked {
            link: link.to_string(),
            message: panic_message(panic.as_ref()),
        }),
    };
    (link, result)
}

/// Hands a finished transfer's failure to `sink`.
pub(crate) fn settle<S>(done: Result<(Arc<Link>, Result<(), TransferError>), JoinError>, sink: &S)
where
    S: Fn(TransferError, &Arc<Link>) + ?Sized,
{
    match done {
        Ok((_, Ok(()))) => {}
        Ok((link, Err(error))) => sink(error, &link),
        Err(error) => tracing::error!(%error, "transfer task did not complete"),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn stop_with_wait_blocks_until_loop_exits() {
        let pool = Arc::new(WorkerPool::new("relay-test", 2));
        let runner = pool.clone();
        let loop_thread = thread::spawn(move || {
            runner
                .run(|mut rx| async move {
                    let wait = Signal::stopped(&mut rx).await;
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    wait
                })
                .unwrap();
        });

        while !pool.is_running() {
            thread::sleep(Duration::from_millis(1));
        }
        pool.stop(true);
        assert!(!pool.is_running());
        assert!(pool.handle().is_none());
        loop_thread.join().unwrap();
    }

    #[test]
    fn stop_on_idle_pool_is_a_no_op() {
        let pool = WorkerPool::new("relay-test", 1);
        pool.stop(true);
        assert!(!pool.is_running());
    }

    #[test]
    fn panic_message_is_recovered() {
        let panic = catch_unwind(|| panic!("worker blew up")).unwrap_err();
        assert_eq!(panic_message(panic.as_ref()), "worker blew up");
    }
}
