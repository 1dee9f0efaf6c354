use relay_utils::{BoxError, Record};

/// A stage that maps the pulled record list to a new record list.
pub trait Processor: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn process(&self, records: Vec<Record>) -> Result<Vec<Record>, BoxError>;
}

/// A stage that maps a list of batches to a new list of batches.
///
/// The link starts batching with a single batch holding every processed
/// record; each batcher may split, merge or drop batches.
pub trait Batcher: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn batch(&self, batches: Vec<Vec<Record>>) -> Result<Vec<Vec<Record>>, BoxError>;
}

/// Processor backed by a closure. Built with [`processor_fn`].
pub struct FnProcessor<F> {
    name: String,
    f: F,
}

impl<F> Processor for FnProcessor<F>
where
    F: Fn(Vec<Record>) -> Result<Vec<Record>, BoxError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, records: Vec<Record>) -> Result<Vec<Record>, BoxError> {
        (self.f)(records)
    }
}

pub fn processor_fn<F>(name: impl Into<String>, f: F) -> FnProcessor<F>
where
    F: Fn(Vec<Record>) -> Result<Vec<Record>, BoxError> + Send + Sync,
{
    FnProcessor {
        name: name.into(),
        f,
    }
}

/// Batcher backed by a closure. Built with [`batcher_fn`].
pub struct FnBatcher<F> {
    name: String,
    f: F,
}

impl<F> Batcher for FnBatcher<F>
where
    F: Fn(Vec<Vec<Record>>) -> Result<Vec<Vec<Record>>, BoxError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn batch(&self, batches: Vec<Vec<Record>>) -> Result<Vec<Vec<Record>>, BoxError> {
        (self.f)(batches)
    }
}

pub fn batcher_fn<F>(name: impl Into<String>, f: F) -> FnBatcher<F>
where
    F: Fn(Vec<Vec<Record>>) -> Result<Vec<Vec<Record>>, BoxError> + Send + Sync,
{
    FnBatcher {
        name: name.into(),
        f,
    }
}

/// Splits every batch into chunks of at most `size` records.
#[derive(Debug, Clone, Copy)]
pub struct Chunks {
    size: usize,
}

impl Chunks {
    /// A `size` of zero is treated as one.
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }
}

impl Batcher for Chunks {
    fn name(&self) -> &str {
        "chunks"
    }

    fn batch(&self, batches: Vec<Vec<Record>>) -> Result<Vec<Vec<Record>>, BoxError> {
        Ok(batches
            .into_iter()
            .flat_map(|batch| {
                batch
                    .chunks(self.size)
                    .map(<[Record]>::to_vec)
                    .collect::<Vec<_>>()
            })
            .collect())
    }
}
