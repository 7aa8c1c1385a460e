use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{core::Collector, HistogramOpts, HistogramVec, Registry};
use tracing::error;

lazy_static! {
    static ref CALL_LATENCY_MS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "interpose_call_latency_ms",
            "Latency of intercepted calls, including deferred completion"
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]),
        &["method"]
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register interceptor metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, CALL_LATENCY_MS.clone());
}

pub fn observe_latency(method: &str, elapsed: Duration) {
    CALL_LATENCY_MS
        .with_label_values(&[method])
        .observe(elapsed.as_secs_f64() * 1000.0);
}

pub fn latency_sample_count(method: &str) -> u64 {
    CALL_LATENCY_MS
        .get_metric_with_label_values(&[method])
        .map(|histogram| histogram.get_sample_count())
        .unwrap_or(0)
}
