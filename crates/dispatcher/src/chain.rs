use std::sync::Arc;

use interpose_core_types::ReturnShape;
use interpose_invocation::{InterceptorBinding, InterceptorChain, ProxyRequest};
use interpose_policy_center::{InterceptionPolicySource, NoPolicy};
use interpose_registry::InterceptorRegistry;
use tracing::info;

use crate::metrics;

/// Resolves the ordered interceptor chain for a call site.
///
/// Static registry bindings come first, then policy bindings, and the
/// concatenation is stably sorted by ascending order. Equal orders keep
/// registration order within each source.
#[derive(Clone)]
pub struct ChainBuilder {
    registry: Arc<dyn InterceptorRegistry>,
    policy: Arc<dyn InterceptionPolicySource>,
}

impl ChainBuilder {
    pub fn new(
        registry: Arc<dyn InterceptorRegistry>,
        policy: Arc<dyn InterceptionPolicySource>,
    ) -> Self {
        Self { registry, policy }
    }

    pub fn without_policy(registry: Arc<dyn InterceptorRegistry>) -> Self {
        Self::new(registry, Arc::new(NoPolicy))
    }

    pub fn registry(&self) -> &Arc<dyn InterceptorRegistry> {
        &self.registry
    }

    pub fn bindings(&self, request: &ProxyRequest) -> Vec<InterceptorBinding> {
        let mut bindings = self.registry.bindings_for(request.method());
        bindings.extend(self.policy.bindings_for(request));
        bindings.sort_by_key(|binding| binding.order);
        bindings
    }

    pub fn build(&self, request: &ProxyRequest) -> Arc<InterceptorChain> {
        let bindings = self.bindings(request);
        let shape = ReturnShape::classify(request.method().returns());
        info!(
            method = %request.method(),
            interceptors = bindings.len(),
            shape = shape.label(),
            "interceptor chain built"
        );
        metrics::record_chain_built();
        let interceptors = bindings
            .into_iter()
            .map(|binding| binding.interceptor)
            .collect();
        Arc::new(InterceptorChain::new(interceptors, shape))
    }
}
