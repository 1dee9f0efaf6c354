use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::events::trigger::TriggerEvent;
use crate::planner::JobId;

/// Publish a [`TriggerEvent`] for `job` every `interval` on `handle`.
///
/// The first event comes one interval after the call. Ticks that land while
/// `paused` reads `true` are dropped, and the task ends by itself once the
/// receiving side of `events` is closed. Abort the returned handle to disarm.
pub fn spawn_interval_trigger(
    handle: &Handle,
    job: JobId,
    interval: Duration,
    paused: watch::Receiver<bool>,
    events: mpsc::Sender<TriggerEvent>,
) -> JoinHandle<()> {
    handle.spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        // a slow loop shifts the schedule instead of bursting
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if *paused.borrow() {
                continue;
            }
            if events.send(TriggerEvent::now(job)).await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arm(
        interval: Duration,
        paused: bool,
    ) -> (JobId, JoinHandle<()>, mpsc::Receiver<TriggerEvent>, watch::Sender<bool>) {
        let (tx, rx) = mpsc::channel(8);
        let (pause, pause_rx) = watch::channel(paused);
        let job = JobId::new();
        let handle = spawn_interval_trigger(&Handle::current(), job, interval, pause_rx, tx);
        (job, handle, rx, pause)
    }

    #[tokio::test]
    async fn fires_repeatedly_after_one_interval() {
        let (job, handle, mut rx, _pause) = arm(Duration::from_millis(40), false);

        let started = std::time::Instant::now();
        for _ in 0..2 {
            let event = time::timeout(Duration::from_millis(300), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event.job, job);
        }
        assert!(started.elapsed() >= Duration::from_millis(80));
        handle.abort();
    }

    #[tokio::test]
    async fn stays_silent_while_paused_and_fires_after_resume() {
        let (_, handle, mut rx, pause) = arm(Duration::from_millis(10), true);

        let silent = time::timeout(Duration::from_millis(80), rx.recv()).await;
        assert!(silent.is_err());

        pause.send_replace(false);
        let fired = time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(matches!(fired, Ok(Some(_))));
        handle.abort();
    }

    #[tokio::test]
    async fn ends_once_receiver_is_dropped() {
        let (_, handle, rx, _pause) = arm(Duration::from_millis(10), false);
        drop(rx);

        let ended = time::timeout(Duration::from_millis(500), handle).await;
        assert!(matches!(ended, Ok(Ok(()))));
    }
}
