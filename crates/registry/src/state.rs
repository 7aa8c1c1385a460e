use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use interpose_core_types::{MethodIdentity, TypeKey};
use interpose_invocation::{Interceptor, InterceptorBinding};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{
    api::InterceptorRegistry, errors::RegistryError, metrics, model::MethodInterceptorCollection,
};

/// In-memory registry with a build phase followed by a read-mostly phase.
///
/// `seal` marks the end of the build phase. Adding after that still appends,
/// but proxies built earlier keep the chains they resolved at construction.
pub struct MethodInterceptorRegistry {
    types: DashMap<TypeKey, Arc<RwLock<MethodInterceptorCollection>>>,
    sealed: AtomicBool,
}

impl MethodInterceptorRegistry {
    pub fn new() -> Self {
        Self {
            types: DashMap::new(),
            sealed: AtomicBool::new(false),
        }
    }

    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
        debug!(types = self.types.len(), "interceptor registry sealed");
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }
}

impl Default for MethodInterceptorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InterceptorRegistry for MethodInterceptorRegistry {
    fn add(&self, method: MethodIdentity, interceptor: Arc<dyn Interceptor>, order: i32) {
        if self.is_sealed() {
            warn!(
                method = %method,
                "interceptor added after registry was sealed; existing proxies keep their chains"
            );
        }
        let ty = method.declaring_type().clone();
        let collection = {
            let entry = self.types.entry(ty.clone()).or_insert_with(|| {
                Arc::new(RwLock::new(MethodInterceptorCollection::new(ty.clone())))
            });
            Arc::clone(entry.value())
        };
        debug!(method = %method, order, interceptor = interceptor.name(), "interceptor registered");
        collection
            .write()
            .add(method, InterceptorBinding::new(order, interceptor));
        metrics::record_binding_added();
        metrics::set_type_count(self.types.len());
    }

    fn contains(&self, ty: &TypeKey) -> bool {
        self.types.contains_key(ty)
    }

    fn get_method_interceptors(
        &self,
        ty: &TypeKey,
    ) -> Result<MethodInterceptorCollection, RegistryError> {
        self.types
            .get(ty)
            .map(|entry| entry.value().read().clone())
            .ok_or_else(|| RegistryError::NotFound(ty.clone()))
    }
}
