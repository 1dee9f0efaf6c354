//! Relays a counter and a clock reading through a buffer to stdout.
//!
//! Run with `cargo run --example relay`. Stops after ten seconds or on Ctrl-C.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use relay_flow::core::adapters::{blocking_inlet, inlet_fn};
use relay_flow::core::logging;
use relay_flow::core::outlets::PrintOutlet;
use relay_flow::utils::BoxError;
use relay_flow::{Buffer, Link, Planner, Pulled};
use serde_json::json;

fn main() -> Result<(), BoxError> {
    logging::init();

    let counter = inlet_fn("counter", |update| Ok(json!(update.transfer_number()).into()));
    let clock = blocking_inlet("clock", |_| {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?;
        Ok(Pulled::One(json!(now.as_millis() as u64)))
    });

    let buffer = Arc::new(Buffer::new().with_count_threshold(4));

    let link = Link::builder()
        .interval(Duration::from_millis(500))
        .tag("demo")
        .inlet(counter)
        .inlet(clock)
        .shared_processor(buffer.clone())
        .outlet(PrintOutlet::new().only_payload(true))
        .build()?;

    let planner = Arc::new(
        Planner::polling(4, Duration::from_millis(100))
            .with_shutdown_at_exit(true)
            .with_exception_observer(|error| eprintln!("relay failure: {error}")),
    );
    planner.add_links([link])?;

    let stopper = planner.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(10));
        buffer.flush();
        stopper.force_transfer();
        stopper.shutdown(true);
    });

    planner.start()?;
    tracing::info!("relay finished");
    Ok(())
}
