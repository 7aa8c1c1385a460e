use std::sync::Arc;

use interpose_core_types::{InterceptError, InvocationId, MethodIdentity, ReturnShape};
use tracing::trace;

use crate::interceptor::InterceptorChain;
use crate::model::{Arguments, ReturnValue};
use crate::request::ProxyRequest;

/// Execution context for a single intercepted call.
///
/// Cloning yields an invocation that shares the request, the chain and the
/// argument storage, but owns its cursor and return slot. The clone starts
/// at the source's current position, so proceeding on it continues the
/// remainder of the chain without touching the source's return value.
#[derive(Clone, Debug)]
pub struct Invocation {
    id: InvocationId,
    request: Arc<ProxyRequest>,
    arguments: Arguments,
    chain: Arc<InterceptorChain>,
    position: usize,
    return_value: ReturnValue,
}

impl Invocation {
    pub fn new(
        request: Arc<ProxyRequest>,
        arguments: Arguments,
        chain: Arc<InterceptorChain>,
    ) -> Self {
        Self {
            id: InvocationId::new(),
            request,
            arguments,
            chain,
            position: 0,
            return_value: ReturnValue::Unset,
        }
    }

    pub fn id(&self) -> &InvocationId {
        &self.id
    }

    pub fn request(&self) -> &ProxyRequest {
        &self.request
    }

    pub fn method(&self) -> &MethodIdentity {
        self.request.method()
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub fn chain(&self) -> &InterceptorChain {
        &self.chain
    }

    pub fn shape(&self) -> ReturnShape {
        self.chain.shape()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn return_value(&self) -> &ReturnValue {
        &self.return_value
    }

    pub fn set_return_value(&mut self, value: impl Into<ReturnValue>) {
        self.return_value = value.into();
    }

    pub fn take_return_value(&mut self) -> ReturnValue {
        std::mem::take(&mut self.return_value)
    }

    /// Advances to the next interceptor, or calls the target once the chain
    /// is exhausted.
    ///
    /// Past the end every call reaches the target again; detecting a double
    /// call is up to the interceptor that issued it.
    pub fn proceed(&mut self) -> Result<(), InterceptError> {
        if let Some(interceptor) = self.chain.get(self.position).cloned() {
            self.position += 1;
            trace!(
                invocation = %self.id,
                position = self.position,
                interceptor = interceptor.name(),
                "proceeding"
            );
            return interceptor.intercept(self);
        }

        trace!(invocation = %self.id, method = %self.request.method(), "invoking target");
        let arguments = self.arguments.snapshot();
        let outcome = self.request.target().invoke(
            self.request.method(),
            self.request.type_arguments(),
            &arguments,
        );
        match outcome {
            Ok(value) => {
                self.return_value = value;
                Ok(())
            }
            Err(err) => {
                self.return_value = ReturnValue::Failed(err.clone());
                Err(err)
            }
        }
    }
}
