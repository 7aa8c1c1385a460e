use std::sync::Arc;

use dashmap::DashMap;
use interpose_core_types::{InterceptError, MethodIdentity, ProxyId, TypeKey, Value};
use interpose_invocation::{DeferredOutput, InterceptorChain, Invokable, ProxyRequest, ReturnValue};
use tracing::debug;

use crate::api::Dispatcher;

/// Marker implemented by wrapper types that route calls through a
/// [`ProxyHandle`].
pub trait Proxy: Send + Sync {
    fn proxy_handle(&self) -> &ProxyHandle;

    fn proxy_id(&self) -> &ProxyId {
        self.proxy_handle().id()
    }
}

#[derive(Clone)]
struct CallSite {
    request: Arc<ProxyRequest>,
    chain: Arc<InterceptorChain>,
}

/// Per-instance dispatch state held by a proxy wrapper.
///
/// Chains are resolved once per call site. Generic methods resolve the open
/// method once and every instantiation reuses that chain.
pub struct ProxyHandle {
    id: ProxyId,
    dispatcher: Arc<Dispatcher>,
    target: Arc<dyn Invokable>,
    sites: DashMap<MethodIdentity, CallSite>,
}

impl Dispatcher {
    /// Builds a proxy handle for `target`, resolving chains for every
    /// declared method up front.
    pub fn create_proxy<I>(
        self: &Arc<Self>,
        target: Arc<dyn Invokable>,
        declared_methods: I,
    ) -> ProxyHandle
    where
        I: IntoIterator<Item = MethodIdentity>,
    {
        let handle = ProxyHandle {
            id: ProxyId::new(),
            dispatcher: Arc::clone(self),
            target,
            sites: DashMap::new(),
        };
        for method in declared_methods {
            let site = handle.resolve(method.clone());
            handle.sites.insert(method, site);
        }
        debug!(proxy = %handle.id, call_sites = handle.sites.len(), "proxy created");
        handle
    }
}

impl ProxyHandle {
    pub fn id(&self) -> &ProxyId {
        &self.id
    }

    pub fn target(&self) -> &Arc<dyn Invokable> {
        &self.target
    }

    pub fn call_site_count(&self) -> usize {
        self.sites.len()
    }

    pub fn chain(&self, method: &MethodIdentity) -> Option<Arc<InterceptorChain>> {
        self.sites.get(method).map(|site| Arc::clone(&site.chain))
    }

    pub fn call(
        &self,
        method: &MethodIdentity,
        type_arguments: Vec<TypeKey>,
        arguments: Vec<Value>,
    ) -> Result<ReturnValue, InterceptError> {
        let site = self.site(method);
        let request = if type_arguments.is_empty() && !site.request.is_generic_method() {
            site.request
        } else {
            Arc::new(site.request.instantiate(type_arguments))
        };
        self.dispatcher.invoke(request, site.chain, arguments)
    }

    /// Calls `method` and waits for its deferred result.
    pub async fn call_deferred(
        &self,
        method: &MethodIdentity,
        type_arguments: Vec<TypeKey>,
        arguments: Vec<Value>,
    ) -> DeferredOutput {
        self.call(method, type_arguments, arguments)?.resolve().await
    }

    fn site(&self, method: &MethodIdentity) -> CallSite {
        if let Some(site) = self.sites.get(method) {
            return site.clone();
        }
        let site = self.resolve(method.clone());
        self.sites
            .entry(method.clone())
            .or_insert(site)
            .value()
            .clone()
    }

    fn resolve(&self, method: MethodIdentity) -> CallSite {
        let request = Arc::new(ProxyRequest::new(method, Vec::new(), Arc::clone(&self.target)));
        let chain = self.dispatcher.builder().build(&request);
        CallSite { request, chain }
    }
}
