use interpose_core_types::ReturnShape;
use lazy_static::lazy_static;
use prometheus::{core::Collector, IntCounter, IntCounterVec, Opts, Registry};
use tracing::error;

lazy_static! {
    static ref DISPATCH_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("interpose_dispatch_calls_total", "Intercepted calls dispatched"),
        &["shape"]
    )
    .unwrap();
    static ref DISPATCH_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "interpose_dispatch_failures_total",
            "Intercepted calls that failed synchronously"
        ),
        &["shape"]
    )
    .unwrap();
    static ref CHAINS_BUILT_TOTAL: IntCounter = IntCounter::new(
        "interpose_chains_built_total",
        "Interceptor chains resolved by the chain builder"
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register dispatcher metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, DISPATCH_CALLS_TOTAL.clone());
    register(registry, DISPATCH_FAILURES_TOTAL.clone());
    register(registry, CHAINS_BUILT_TOTAL.clone());
}

pub fn record_dispatch(shape: ReturnShape) {
    DISPATCH_CALLS_TOTAL.with_label_values(&[shape.label()]).inc();
}

pub fn record_failure(shape: ReturnShape) {
    DISPATCH_FAILURES_TOTAL
        .with_label_values(&[shape.label()])
        .inc();
}

pub fn record_chain_built() {
    CHAINS_BUILT_TOTAL.inc();
}
