use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{self, BoxFuture, FutureExt, Shared};
use interpose_core_types::{InterceptError, Value};
use serde::{Deserialize, Serialize};
use tokio::task::JoinError;
use tracing::trace;

/// Outcome of a deferred call: `None` for fire-and-complete methods.
pub type DeferredOutput = Result<Option<Value>, InterceptError>;

/// Where staged deferred pipelines execute.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageScheduling {
    /// Spawn onto the ambient tokio runtime, lazy when none is running.
    #[default]
    Spawn,
    /// Run when the handle is first polled.
    Inline,
}

/// Clonable completion handle for a deferred call.
///
/// Every clone observes the same completion, so a handle can be awaited by
/// an interceptor and by the original caller.
#[derive(Clone)]
pub struct DeferredHandle {
    inner: Shared<BoxFuture<'static, DeferredOutput>>,
}

impl DeferredHandle {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = DeferredOutput> + Send + 'static,
    {
        Self {
            inner: future.boxed().shared(),
        }
    }

    pub fn ready(output: DeferredOutput) -> Self {
        Self::new(future::ready(output))
    }

    pub fn completed() -> Self {
        Self::ready(Ok(None))
    }

    pub fn resolved(value: Value) -> Self {
        Self::ready(Ok(Some(value)))
    }

    pub fn failed(err: InterceptError) -> Self {
        Self::ready(Err(err))
    }

    /// Starts `future` according to `scheduling` and returns its handle.
    ///
    /// A spawned task that is cancelled or panics completes the handle with
    /// [`InterceptError::Cancelled`] or [`InterceptError::Panicked`].
    pub fn schedule<F>(scheduling: StageScheduling, future: F) -> Self
    where
        F: Future<Output = DeferredOutput> + Send + 'static,
    {
        match scheduling {
            StageScheduling::Inline => Self::new(future),
            StageScheduling::Spawn => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let task = runtime.spawn(future);
                    Self::new(async move { task.await.unwrap_or_else(|err| Err(join_failure(err))) })
                }
                Err(_) => {
                    trace!("no tokio runtime available; deferred stages run on first poll");
                    Self::new(future)
                }
            },
        }
    }

    pub fn peek(&self) -> Option<&DeferredOutput> {
        self.inner.peek()
    }

    pub fn is_complete(&self) -> bool {
        self.peek().is_some()
    }
}

fn join_failure(err: JoinError) -> InterceptError {
    if err.is_cancelled() {
        InterceptError::Cancelled(err.to_string())
    } else {
        InterceptError::Panicked(err.to_string())
    }
}

impl Future for DeferredHandle {
    type Output = DeferredOutput;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for DeferredHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredHandle")
            .field("complete", &self.is_complete())
            .finish()
    }
}
