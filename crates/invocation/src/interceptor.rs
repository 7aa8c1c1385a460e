use std::fmt;
use std::sync::Arc;

use interpose_core_types::{InterceptError, ReturnShape};

use crate::invocation::Invocation;

/// A cross-cutting behavior wrapped around a method call.
///
/// Implementations run their own logic and decide whether and when to call
/// [`Invocation::proceed`]. Calling it at most once keeps single-call
/// semantics; not calling it short-circuits the rest of the chain.
pub trait Interceptor: Send + Sync {
    fn intercept(&self, invocation: &mut Invocation) -> Result<(), InterceptError>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

pub struct InterceptFn<F> {
    name: String,
    f: F,
}

/// Builds an interceptor from a closure.
pub fn intercept_fn<F>(name: impl Into<String>, f: F) -> InterceptFn<F>
where
    F: Fn(&mut Invocation) -> Result<(), InterceptError> + Send + Sync,
{
    InterceptFn {
        name: name.into(),
        f,
    }
}

impl<F> Interceptor for InterceptFn<F>
where
    F: Fn(&mut Invocation) -> Result<(), InterceptError> + Send + Sync,
{
    fn intercept(&self, invocation: &mut Invocation) -> Result<(), InterceptError> {
        (self.f)(invocation)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// An interceptor together with its ordering key. Lower orders run first.
#[derive(Clone)]
pub struct InterceptorBinding {
    pub order: i32,
    pub interceptor: Arc<dyn Interceptor>,
}

impl InterceptorBinding {
    pub fn new(order: i32, interceptor: Arc<dyn Interceptor>) -> Self {
        Self { order, interceptor }
    }
}

impl fmt::Debug for InterceptorBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorBinding")
            .field("order", &self.order)
            .field("interceptor", &self.interceptor.name())
            .finish()
    }
}

/// Ordered, immutable interceptor list for one method, with its call shape.
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
    shape: ReturnShape,
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>, shape: ReturnShape) -> Self {
        Self {
            interceptors,
            shape,
        }
    }

    pub fn empty(shape: ReturnShape) -> Self {
        Self::new(Vec::new(), shape)
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Arc<dyn Interceptor>> {
        self.interceptors.get(position)
    }

    pub fn shape(&self) -> ReturnShape {
        self.shape
    }

    pub fn names(&self) -> Vec<&str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("interceptors", &self.names())
            .field("shape", &self.shape)
            .finish()
    }
}
