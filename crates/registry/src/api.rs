use interpose_core_types::{MethodIdentity, TypeKey};
use interpose_invocation::{Interceptor, InterceptorBinding};
use std::sync::Arc;

use crate::errors::RegistryError;
use crate::model::MethodInterceptorCollection;

/// Statically registered interceptors, grouped by declaring type.
///
/// Populated during the build phase; read concurrently afterwards.
pub trait InterceptorRegistry: Send + Sync {
    fn add(&self, method: MethodIdentity, interceptor: Arc<dyn Interceptor>, order: i32);
    fn contains(&self, ty: &TypeKey) -> bool;
    fn get_method_interceptors(
        &self,
        ty: &TypeKey,
    ) -> Result<MethodInterceptorCollection, RegistryError>;

    /// Bindings for one method in registration order, empty when none exist.
    fn bindings_for(&self, method: &MethodIdentity) -> Vec<InterceptorBinding> {
        if !self.contains(method.declaring_type()) {
            return Vec::new();
        }
        self.get_method_interceptors(method.declaring_type())
            .map(|collection| collection.get(method).to_vec())
            .unwrap_or_default()
    }
}
