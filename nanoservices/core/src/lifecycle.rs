use parking_lot::Mutex;
use relay_utils::BoxError;

/// Start/shutdown guard shared by inlets and outlets.
///
/// The active flag is checked and flipped under a lock, so under any
/// interleaving a node's start hook runs at most once per inactive to active
/// transition and its shutdown hook at most once per active to inactive
/// transition. The hook itself runs after the lock is released.
#[derive(Debug, Default)]
pub struct Lifecycle {
    active: Mutex<bool>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        *self.active.lock()
    }

    /// Runs `hook` if the node was inactive. Returns `Ok(false)` when the
    /// node was already active and nothing ran.
    pub fn try_start<F>(&self, hook: F) -> Result<bool, BoxError>
    where
        F: FnOnce() -> Result<(), BoxError>,
    {
        if !self.flip(true) {
            return Ok(false);
        }
        hook()?;
        Ok(true)
    }

    /// Runs `hook` if the node was active. Returns `Ok(false)` when the node
    /// was already inactive and nothing ran.
    pub fn try_shutdown<F>(&self, hook: F) -> Result<bool, BoxError>
    where
        F: FnOnce() -> Result<(), BoxError>,
    {
        if !self.flip(false) {
            return Ok(false);
        }
        hook()?;
        Ok(true)
    }

    fn flip(&self, to: bool) -> bool {
        let mut active = self.active.lock();
        if *active == to {
            return false;
        }
        *active = to;
        true
    }
}
