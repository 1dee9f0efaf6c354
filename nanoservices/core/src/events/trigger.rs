use std::time::Instant;

use crate::planner::JobId;

/// A scheduled job came due.
#[derive(Debug, Clone, Copy)]
pub struct TriggerEvent {
    /// Which job this event is for
    pub job: JobId,
    /// When the trigger fired
    pub fired_at: Instant,
}

impl TriggerEvent {
    pub fn now(job: JobId) -> Self {
        Self {
            job,
            fired_at: Instant::now(),
        }
    }
}
