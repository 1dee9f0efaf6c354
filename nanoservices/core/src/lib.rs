//! relay_core: scheduled data relay between inlets and outlets
//!
//! This crate provides the building blocks for moving records on a schedule:
//! inlets produce records, a [`Link`](link::Link) runs them through its
//! processors and batchers and pushes every batch to its outlets, and a
//! [`Planner`](planner::Planner) transfers each link periodically on a worker
//! pool until shut down.
//!
//! Basic usage:
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use relay_core::adapters::inlet_fn;
//! use relay_core::link::Link;
//! use relay_core::outlets::PrintOutlet;
//! use relay_core::planner::Planner;
//! use serde_json::json;
//!
//! relay_core::logging::init();
//!
//! let link = Link::builder()
//!     .interval(Duration::from_secs(1))
//!     .tag("clock")
//!     .inlet(inlet_fn("clock", |update| Ok(json!(update.transfer_number()).into())))
//!     .outlet(PrintOutlet::new().only_payload(true))
//!     .build()
//!     .unwrap();
//!
//! let planner = Arc::new(Planner::polling(4, Duration::from_millis(100)).with_shutdown_at_exit(true));
//! planner.add_links([link]).unwrap();
//! // blocks until Ctrl-C or `planner.shutdown(..)` from another thread
//! planner.start().unwrap();
//! ```

pub mod adapters;
pub mod builder;
pub mod config;
pub mod events;
pub mod inlets;
pub mod lifecycle;
pub mod link;
pub mod outlets;
pub mod planner;
pub mod processors;

pub mod logging;

pub mod metrics;

pub use builder::{BuildError, LinkBuilder};
pub use inlets::{Inlet, InletNode, Pulled};
pub use link::{Link, Update};
pub use outlets::{Outlet, OutletNode};
pub use planner::{IntervalPlanner, Planner, PollingPlanner, Scheduler};
pub use processors::{Batcher, Buffer, Processor};
