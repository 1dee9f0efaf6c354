use tokio::sync::mpsc;

use crate::events::trigger::TriggerEvent;

/// Fan-in of every job's trigger into one scheduler loop.
///
/// The bus keeps a sender of its own, so `next` only yields `None` once the
/// bus itself is gone. Loops stop on their own signal, not on a closed bus.
pub struct TriggerBus {
    publisher: mpsc::Sender<TriggerEvent>,
    events: mpsc::Receiver<TriggerEvent>,
}

impl TriggerBus {
    pub const CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::with_capacity(Self::CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (publisher, events) = mpsc::channel(capacity.max(1));
        Self { publisher, events }
    }

    /// A sender for one trigger task.
    pub fn publisher(&self) -> mpsc::Sender<TriggerEvent> {
        self.publisher.clone()
    }

    pub async fn next(&mut self) -> Option<TriggerEvent> {
        self.events.recv().await
    }
}

impl Default for TriggerBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::JobId;

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let mut bus = TriggerBus::with_capacity(4);
        let (a, b) = (JobId::new(), JobId::new());

        bus.publisher().send(TriggerEvent::now(a)).await.unwrap();
        bus.publisher().send(TriggerEvent::now(b)).await.unwrap();

        assert_eq!(bus.next().await.unwrap().job, a);
        assert_eq!(bus.next().await.unwrap().job, b);
    }

    #[tokio::test]
    async fn zero_capacity_is_bumped_to_one() {
        let mut bus = TriggerBus::with_capacity(0);
        let job = JobId::new();
        bus.publisher().try_send(TriggerEvent::now(job)).unwrap();
        assert_eq!(bus.next().await.unwrap().job, job);
    }
}
