use async_trait::async_trait;
use relay_utils::BoxError;

use super::traits::{Inlet, Pulled};
use crate::link::Update;

/// Inlet that never produces anything.
#[derive(Debug, Clone, Default)]
pub struct NullInlet;

#[async_trait]
impl Inlet for NullInlet {
    fn name(&self) -> &str {
        "null"
    }

    async fn pull(&self, _: &Update) -> Result<Pulled, BoxError> {
        Ok(Pulled::empty())
    }
}
