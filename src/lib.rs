pub use relay_core as core;
pub use relay_utils as utils;

// Convenience re-exports for common usage
pub use relay_core::builder::{BuildError, LinkBuilder};
pub use relay_core::inlets::{Inlet, InletNode, Pulled};
pub use relay_core::link::{Link, Update};
pub use relay_core::outlets::{Outlet, OutletNode};
pub use relay_core::planner::{IntervalPlanner, Planner, PollingPlanner};
pub use relay_core::processors::{Batcher, Buffer, Processor};
pub use relay_utils::{Batch, Metadata, Payload, Record, RelayResult};
