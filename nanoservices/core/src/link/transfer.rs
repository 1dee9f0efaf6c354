use std::sync::atomic::Ordering;
use std::time::Instant;

use futures_util::future::try_join_all;
use relay_utils::{Batch, BoxError, Record, Stage, TransferError};
use tokio::sync::Semaphore;
use tracing::Instrument;

use super::{Link, Update};
use crate::inlets::InletNode;
use crate::metrics;
use crate::outlets::OutletNode;

impl Link {
    /// Run one transfer to completion on a fresh current-thread runtime.
    ///
    /// This is what scheduler workers call. It blocks the calling thread and
    /// must not be called from inside an async context; use [`Link::run`]
    /// there instead.
    pub fn transfer(&self) -> Result<(), TransferError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run())
    }

    /// Run one transfer on the caller's runtime.
    ///
    /// Every call takes the next transfer number, so concurrent transfers
    /// of the same link see distinct updates.
    pub async fn run(&self) -> Result<(), TransferError> {
        let number = self.transfer_number.fetch_add(1, Ordering::SeqCst);
        let update = Update::new(self.tags.clone(), number);
        let label = self.label();
        let span = tracing::info_span!("transfer", link = %label, update = %update);

        let started = Instant::now();
        let result = self.cycle(&update).instrument(span).await;

        metrics::inc_transfer(&label);
        metrics::observe_duration(&label, started.elapsed().as_secs_f64() * 1000.0);
        if result.is_err() {
            metrics::inc_failure(&label);
        }
        result
    }

    async fn cycle(&self, update: &Update) -> Result<(), TransferError> {
        tracing::debug!("transfer started");
        let records = self.pull_all(update).await?;
        let records = self.process(records, update)?;
        let batches = self.group(records, update)?;
        self.dispatch(batches, update).await?;
        tracing::debug!("transfer finished");
        Ok(())
    }

    async fn pull_all(&self, update: &Update) -> Result<Vec<Record>, TransferError> {
        let inlets = self.inlets();
        let gate = Semaphore::new(self.inlet_concurrency);
        let pulls = inlets.iter().map(|inlet| self.pull_one(inlet, update, &gate));
        let pulled = try_join_all(pulls).await?;
        Ok(pulled.into_iter().flatten().collect())
    }

    async fn pull_one(
        &self,
        inlet: &InletNode,
        update: &Update,
        gate: &Semaphore,
    ) -> Result<Vec<Record>, TransferError> {
        let pulled = match gate.acquire().await {
            Ok(_permit) => inlet.pull(update).await,
            Err(closed) => Err(closed.into()),
        };
        match pulled {
            Ok(records) => {
                tracing::trace!(inlet = inlet.name(), count = records.len(), "pulled");
                Ok(records)
            }
            Err(source) => {
                let error = self.failure(Stage::Pull, inlet.name(), update, source);
                self.isolate(error, Vec::new())
            }
        }
    }

    fn process(&self, mut records: Vec<Record>, update: &Update) -> Result<Vec<Record>, TransferError> {
        for processor in &self.processors {
            let input = if self.ignore_exceptions {
                records.clone()
            } else {
                std::mem::take(&mut records)
            };
            match processor.process(input) {
                Ok(processed) => records = processed,
                Err(source) => {
                    let error = self.failure(Stage::Process, processor.name(), update, source);
                    self.isolate(error, ())?;
                }
            }
        }
        Ok(records)
    }

    fn group(&self, records: Vec<Record>, update: &Update) -> Result<Vec<Vec<Record>>, TransferError> {
        let mut batches = vec![records];
        for batcher in &self.batchers {
            let input = if self.ignore_exceptions {
                batches.clone()
            } else {
                std::mem::take(&mut batches)
            };
            match batcher.batch(input) {
                Ok(grouped) => batches = grouped,
                Err(source) => {
                    let error = self.failure(Stage::Batch, batcher.name(), update, source);
                    self.isolate(error, ())?;
                }
            }
        }
        Ok(batches)
    }

    async fn dispatch(&self, batches: Vec<Vec<Record>>, update: &Update) -> Result<(), TransferError> {
        let outlets = self.outlets();
        for records in batches.into_iter().filter(|batch| !batch.is_empty()) {
            let batch = Batch::new(records);
            let pushes = outlets.iter().map(|outlet| {
                let handed = if self.copy_records {
                    batch.deep_copy()
                } else {
                    batch.clone()
                };
                self.push_one(outlet, handed, update)
            });
            try_join_all(pushes).await?;
        }
        Ok(())
    }

    async fn push_one(
        &self,
        outlet: &OutletNode,
        batch: Batch,
        update: &Update,
    ) -> Result<(), TransferError> {
        let count = batch.len();
        match outlet.push(batch, update).await {
            Ok(()) => {
                tracing::trace!(outlet = outlet.name(), count, "pushed");
                Ok(())
            }
            Err(source) => {
                let error = self.failure(Stage::Push, outlet.name(), update, source);
                self.isolate(error, ())
            }
        }
    }

    fn failure(&self, stage: Stage, node: &str, update: &Update, source: BoxError) -> TransferError {
        TransferError::node(stage, node, format!("{self} during update {update}"), source)
    }
}
