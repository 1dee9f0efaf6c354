pub mod buffer;
pub mod traits;

pub use buffer::{Buffer, Controller};
pub use traits::{batcher_fn, processor_fn, Batcher, Chunks, FnBatcher, FnProcessor, Processor};
