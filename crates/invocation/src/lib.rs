pub mod deferred;
pub mod interceptor;
pub mod invocation;
pub mod model;
pub mod request;

pub use deferred::{DeferredHandle, DeferredOutput, StageScheduling};
pub use interceptor::{intercept_fn, InterceptFn, Interceptor, InterceptorBinding, InterceptorChain};
pub use invocation::Invocation;
pub use model::{Arguments, ReturnValue};
pub use request::{invoke_fn, InvokeFn, Invokable, ProxyRequest};
