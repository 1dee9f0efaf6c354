use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

/// Timestamp layout of log lines, e.g. `2024-01-31 12:00:00.123`.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Install a global subscriber for programs running relays.
///
/// Filtering follows `RUST_LOG` and falls back to `info`. Lines carry a
/// local millisecond timestamp and the emitting thread's name, so transfers
/// on pool threads are told apart from the scheduler loop. Library code never
/// calls this. Calling it again is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_thread_names(true)
        .try_init();
}
