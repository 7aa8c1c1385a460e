use std::fmt;
use std::sync::Arc;

use interpose_core_types::{InterceptError, MethodIdentity, TypeKey, Value};

use crate::model::ReturnValue;

/// Terminal call into the proxied instance.
///
/// Wrapper types implement this by matching on the method and forwarding to
/// the real implementation. Deferred methods return
/// [`ReturnValue::Deferred`].
pub trait Invokable: Send + Sync + 'static {
    fn invoke(
        &self,
        method: &MethodIdentity,
        type_arguments: &[TypeKey],
        arguments: &[Value],
    ) -> Result<ReturnValue, InterceptError>;
}

/// Adapts a closure into an [`Invokable`].
pub struct InvokeFn<F> {
    f: F,
}

pub fn invoke_fn<F>(f: F) -> InvokeFn<F>
where
    F: Fn(&MethodIdentity, &[TypeKey], &[Value]) -> Result<ReturnValue, InterceptError>
        + Send
        + Sync
        + 'static,
{
    InvokeFn { f }
}

impl<F> Invokable for InvokeFn<F>
where
    F: Fn(&MethodIdentity, &[TypeKey], &[Value]) -> Result<ReturnValue, InterceptError>
        + Send
        + Sync
        + 'static,
{
    fn invoke(
        &self,
        method: &MethodIdentity,
        type_arguments: &[TypeKey],
        arguments: &[Value],
    ) -> Result<ReturnValue, InterceptError> {
        (self.f)(method, type_arguments, arguments)
    }
}

/// Immutable description of one proxied call site.
#[derive(Clone)]
pub struct ProxyRequest {
    method: MethodIdentity,
    type_arguments: Vec<TypeKey>,
    target: Arc<dyn Invokable>,
    is_generic_method: bool,
}

impl ProxyRequest {
    pub fn new(
        method: MethodIdentity,
        type_arguments: Vec<TypeKey>,
        target: Arc<dyn Invokable>,
    ) -> Self {
        let is_generic_method = method.is_generic();
        Self {
            method,
            type_arguments,
            target,
            is_generic_method,
        }
    }

    /// Same call site bound to another instantiation of a generic method.
    pub fn instantiate(&self, type_arguments: Vec<TypeKey>) -> Self {
        Self {
            type_arguments,
            ..self.clone()
        }
    }

    pub fn method(&self) -> &MethodIdentity {
        &self.method
    }

    pub fn declaring_type(&self) -> &TypeKey {
        self.method.declaring_type()
    }

    pub fn type_arguments(&self) -> &[TypeKey] {
        &self.type_arguments
    }

    pub fn target(&self) -> &Arc<dyn Invokable> {
        &self.target
    }

    pub fn is_generic_method(&self) -> bool {
        self.is_generic_method
    }
}

impl fmt::Debug for ProxyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyRequest")
            .field("method", &self.method.to_string())
            .field("type_arguments", &self.type_arguments)
            .field("is_generic_method", &self.is_generic_method)
            .finish_non_exhaustive()
    }
}
