use async_trait::async_trait;
use relay_utils::{Batch, BoxError};

use super::traits::Outlet;
use crate::link::Update;

/// Outlet that discards everything it receives.
#[derive(Debug, Clone, Default)]
pub struct NullOutlet;

#[async_trait]
impl Outlet for NullOutlet {
    fn name(&self) -> &str {
        "null"
    }

    async fn push(&self, _: Batch, _: &Update) -> Result<(), BoxError> {
        Ok(())
    }
}
