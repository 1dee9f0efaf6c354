use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use once_cell::sync::Lazy;

// Global registry and metrics are initialized lazily.
static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("relay".to_string()), None).unwrap_or_default()
});

static TRANSFER_DURATION_MS: Lazy<Option<HistogramVec>> = Lazy::new(|| {
    let opts = HistogramOpts::new("transfer_duration_ms", "Link transfer duration in milliseconds");
    register(HistogramVec::new(opts, &["link"]))
});

static TRANSFERS: Lazy<Option<CounterVec>> = Lazy::new(|| {
    let opts = Opts::new("transfers_total", "Total link transfers");
    register(CounterVec::new(opts, &["link"]))
});

static TRANSFER_FAILURES: Lazy<Option<CounterVec>> = Lazy::new(|| {
    let opts = Opts::new("transfer_failures_total", "Total failed link transfers");
    register(CounterVec::new(opts, &["link"]))
});

fn register<M>(metric: prometheus::Result<M>) -> Option<M>
where
    M: prometheus::core::Collector + Clone + 'static,
{
    let metric = match metric {
        Ok(metric) => metric,
        Err(error) => {
            tracing::warn!(%error, "failed to create metric");
            return None;
        }
    };
    if let Err(error) = REGISTRY.register(Box::new(metric.clone())) {
        tracing::warn!(%error, "failed to register metric");
    }
    Some(metric)
}

/// Observe a transfer duration in milliseconds.
pub fn observe_duration(link: &str, duration_ms: f64) {
    if let Some(hist) = TRANSFER_DURATION_MS.as_ref() {
        hist.with_label_values(&[link]).observe(duration_ms);
    }
}

/// Increment the transfer counter for a link.
pub fn inc_transfer(link: &str) {
    if let Some(counter) = TRANSFERS.as_ref() {
        counter.with_label_values(&[link]).inc();
    }
}

/// Increment the failure counter for a link.
pub fn inc_failure(link: &str) {
    if let Some(counter) = TRANSFER_FAILURES.as_ref() {
        counter.with_label_values(&[link]).inc();
    }
}

/// Gather metrics as text in Prometheus exposition format.
///
/// # Example
///
/// ```no_run
/// use relay_core::metrics;
/// metrics::inc_transfer("weather");
/// let body = metrics::gather_text();
/// println!("metrics:\n{}", body);
/// ```
pub fn gather_text() -> String {
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(error) = TextEncoder::new().encode(&metric_families, &mut buffer) {
        tracing::warn!(%error, "failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
