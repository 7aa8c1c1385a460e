use lazy_static::lazy_static;
use prometheus::{core::Collector, IntGauge, Registry};
use tracing::error;

lazy_static! {
    static ref REGISTRY_TYPES_TOTAL: IntGauge = IntGauge::new(
        "interpose_registry_types_total",
        "Types with statically registered interceptors"
    )
    .unwrap();
    static ref REGISTRY_BINDINGS_TOTAL: IntGauge = IntGauge::new(
        "interpose_registry_bindings_total",
        "Statically registered interceptor bindings"
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register registry metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, REGISTRY_TYPES_TOTAL.clone());
    register(registry, REGISTRY_BINDINGS_TOTAL.clone());
}

pub fn set_type_count(count: usize) {
    REGISTRY_TYPES_TOTAL.set(count as i64);
}

pub fn record_binding_added() {
    REGISTRY_BINDINGS_TOTAL.inc();
}
