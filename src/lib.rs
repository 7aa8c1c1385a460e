//! Interpose: method interception kernel.
//!
//! Proxies route every call through a [`Dispatcher`], which resolves the
//! ordered interceptor chain for the call site once and drives the proceed
//! protocol. Deferred calls are staged by [`Staged`] interceptors so before
//! and after hooks run around completion rather than around the call.

pub mod kernel;
pub mod logging;
pub mod metrics;

pub use interpose_core_types::{
    InterceptError, InvocationId, MethodIdentity, ProxyId, ReturnShape, ReturnType, TypeKey, Value,
};
pub use interpose_dispatcher::{ChainBuilder, DispatchCall, DispatchError, Dispatcher, Proxy, ProxyHandle};
pub use interpose_interceptors::{LoggingInterceptor, Staged, StagedInterceptor, TimingInterceptor};
pub use interpose_invocation::{
    intercept_fn, invoke_fn, Arguments, DeferredHandle, DeferredOutput, Interceptor,
    InterceptorBinding, InterceptorChain, Invocation, Invokable, ProxyRequest, ReturnValue,
    StageScheduling,
};
pub use interpose_policy_center::{
    InterceptionPolicySource, InterceptorCatalog, PolicyError, PolicySnapshot, PolicyTable, RuleSpec,
};
pub use interpose_registry::{
    InterceptorRegistry, MethodInterceptorCollection, MethodInterceptorRegistry, RegistryError,
};
pub use kernel::InterceptionKernel;
