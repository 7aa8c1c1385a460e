use std::time::Instant;

use interpose_core_types::InterceptError;
use interpose_invocation::{DeferredHandle, Interceptor, Invocation, ReturnValue};
use tracing::trace;

use crate::metrics;

/// Records call latency into `interpose_call_latency_ms`.
///
/// Deferred calls are measured up to completion of the returned handle.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimingInterceptor;

impl Interceptor for TimingInterceptor {
    fn intercept(&self, invocation: &mut Invocation) -> Result<(), InterceptError> {
        let started = Instant::now();
        let method = invocation.method().to_string();
        let outcome = invocation.proceed();

        match invocation.return_value() {
            ReturnValue::Deferred(handle) => {
                let handle = handle.clone();
                invocation.set_return_value(DeferredHandle::new(async move {
                    let output = handle.await;
                    let elapsed = started.elapsed();
                    trace!(%method, ?elapsed, "deferred call completed");
                    metrics::observe_latency(&method, elapsed);
                    output
                }));
            }
            _ => {
                let elapsed = started.elapsed();
                trace!(%method, ?elapsed, "call completed");
                metrics::observe_latency(&method, elapsed);
            }
        }
        outcome
    }

    fn name(&self) -> &str {
        "timing"
    }
}
