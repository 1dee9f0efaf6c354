use async_trait::async_trait;
use relay_utils::{Batch, BoxError};

use crate::link::Update;

/// A data consumer handed every non-empty batch of a transfer.
#[async_trait]
pub trait Outlet: Send + Sync {
    fn name(&self) -> &str;

    /// Consume `records` for the transfer identified by `update`.
    ///
    /// `records` may be shared with other outlets of the same link. Use
    /// [`Batch::make_mut`] to get a private copy before modifying it.
    async fn push(&self, records: Batch, update: &Update) -> Result<(), BoxError>;

    fn on_start(&self) -> Result<(), BoxError> {
        Ok(())
    }

    fn on_shutdown(&self) -> Result<(), BoxError> {
        Ok(())
    }
}
