use interpose_core_types::InterceptError;
use interpose_invocation::{DeferredOutput, Invocation, ReturnValue, StageScheduling};
use tracing::{debug, warn};

use crate::staged::{Staged, StagedInterceptor};

/// Logs entry, exit and deferred completion of every call it wraps.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingInterceptor;

impl LoggingInterceptor {
    pub fn staged(scheduling: StageScheduling) -> Staged<Self> {
        Staged::new(Self).with_scheduling(scheduling)
    }
}

impl StagedInterceptor for LoggingInterceptor {
    fn before_invoke(&self, invocation: &mut Invocation) -> Result<(), InterceptError> {
        debug!(
            invocation = %invocation.id(),
            method = %invocation.method(),
            arguments = invocation.arguments().len(),
            "call started"
        );
        Ok(())
    }

    fn after_invoke(&self, invocation: &mut Invocation) -> Result<(), InterceptError> {
        let outcome = match invocation.return_value() {
            ReturnValue::Unset | ReturnValue::Void => "void",
            ReturnValue::Value(_) => "value",
            ReturnValue::Deferred(_) => "deferred",
            ReturnValue::Failed(_) => "failed",
        };
        debug!(
            invocation = %invocation.id(),
            method = %invocation.method(),
            outcome,
            "call returned"
        );
        Ok(())
    }

    fn after_completion(
        &self,
        invocation: &mut Invocation,
        completion: &DeferredOutput,
    ) -> Result<(), InterceptError> {
        match completion {
            Ok(_) => debug!(invocation = %invocation.id(), method = %invocation.method(), "deferred call completed"),
            Err(err) => warn!(invocation = %invocation.id(), method = %invocation.method(), %err, "deferred call failed"),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}
