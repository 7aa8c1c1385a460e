use std::sync::Arc;

use interpose_core_types::{InterceptError, ReturnShape};
use interpose_invocation::{DeferredHandle, DeferredOutput, Interceptor, Invocation, StageScheduling};
use tracing::trace;

/// Before/after hooks run around `proceed` by [`Staged`].
///
/// For immediate calls the hooks run on the calling thread. For deferred
/// calls they run as sequential stages of the pipeline behind the returned
/// handle, and `after_completion` additionally sees the completion outcome.
pub trait StagedInterceptor: Send + Sync + 'static {
    fn before_invoke(&self, _invocation: &mut Invocation) -> Result<(), InterceptError> {
        Ok(())
    }

    /// On the deferred path a failed proceed is still delivered after this
    /// hook runs, even if it sets a new return value. Interceptors that
    /// recover from deferred failures implement [`Interceptor`] directly.
    fn after_invoke(&self, _invocation: &mut Invocation) -> Result<(), InterceptError> {
        Ok(())
    }

    fn after_completion(
        &self,
        _invocation: &mut Invocation,
        _completion: &DeferredOutput,
    ) -> Result<(), InterceptError> {
        Ok(())
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Adapts [`StagedInterceptor`] hooks into an [`Interceptor`] that is aware
/// of the call's return shape.
pub struct Staged<S> {
    hooks: Arc<S>,
    scheduling: StageScheduling,
}

impl<S: StagedInterceptor> Staged<S> {
    pub fn new(hooks: S) -> Self {
        Self {
            hooks: Arc::new(hooks),
            scheduling: StageScheduling::default(),
        }
    }

    pub fn with_scheduling(mut self, scheduling: StageScheduling) -> Self {
        self.scheduling = scheduling;
        self
    }

    pub fn hooks(&self) -> &S {
        &self.hooks
    }

    pub fn scheduling(&self) -> StageScheduling {
        self.scheduling
    }

    fn intercept_immediate(&self, invocation: &mut Invocation) -> Result<(), InterceptError> {
        self.hooks.before_invoke(invocation)?;
        invocation.proceed()?;
        self.hooks.after_invoke(invocation)
    }

    /// Replaces the caller's return slot with a handle that completes once
    /// before, proceed and the after-hooks have all run.
    ///
    /// `outer` stands in for the caller's invocation inside the pipeline;
    /// `inner` is the independent clone that proceeds down the chain.
    fn intercept_deferred(&self, invocation: &mut Invocation, shape: ReturnShape) {
        let hooks = Arc::clone(&self.hooks);
        let outer = invocation.clone();
        let inner = invocation.clone();
        trace!(invocation = %invocation.id(), shape = shape.label(), "staging deferred call");
        let pipeline = run_pipeline(hooks, shape, outer, inner);
        invocation.set_return_value(DeferredHandle::schedule(self.scheduling, pipeline));
    }
}

impl<S: StagedInterceptor> Interceptor for Staged<S> {
    fn intercept(&self, invocation: &mut Invocation) -> Result<(), InterceptError> {
        match invocation.shape() {
            ReturnShape::Immediate => self.intercept_immediate(invocation),
            shape => {
                self.intercept_deferred(invocation, shape);
                Ok(())
            }
        }
    }

    fn name(&self) -> &str {
        self.hooks.name()
    }
}

async fn run_pipeline<S: StagedInterceptor>(
    hooks: Arc<S>,
    shape: ReturnShape,
    mut outer: Invocation,
    mut inner: Invocation,
) -> DeferredOutput {
    hooks.before_invoke(&mut outer)?;

    let completion = match inner.proceed() {
        Ok(()) => inner.take_return_value().resolve().await,
        Err(err) => Err(err),
    };

    if shape == ReturnShape::DeferredValue {
        if let Ok(Some(value)) = &completion {
            outer.set_return_value(value.clone());
        }
    }

    let mut failure = completion.as_ref().err().cloned();
    if let Err(err) = hooks.after_invoke(&mut outer) {
        failure = Some(supersede(err, failure));
    }
    if let Err(err) = hooks.after_completion(&mut outer, &completion) {
        failure = Some(supersede(err, failure));
    }
    if let Some(err) = failure {
        return Err(err);
    }

    match shape {
        ReturnShape::DeferredValue => outer.take_return_value().resolve().await,
        _ => Ok(None),
    }
}

fn supersede(err: InterceptError, in_flight: Option<InterceptError>) -> InterceptError {
    match in_flight {
        Some(earlier) => err.chain(earlier),
        None => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interpose_core_types::{MethodIdentity, ReturnType, TypeKey, Value};
    use interpose_invocation::{invoke_fn, Arguments, InterceptorChain, ProxyRequest, ReturnValue};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Worker;

    struct Recorder {
        label: &'static str,
        log: Log,
        observed: Arc<Mutex<Option<Value>>>,
        overwrite: Option<Value>,
        fail_after: bool,
        fail_before: bool,
    }

    impl Recorder {
        fn new(label: &'static str, log: Log) -> Self {
            Self {
                label,
                log,
                observed: Arc::new(Mutex::new(None)),
                overwrite: None,
                fail_after: false,
                fail_before: false,
            }
        }
    }

    impl StagedInterceptor for Recorder {
        fn before_invoke(&self, _invocation: &mut Invocation) -> Result<(), InterceptError> {
            self.log.lock().push(format!("{}-before", self.label));
            if self.fail_before {
                return Err(InterceptError::new("denied"));
            }
            Ok(())
        }

        fn after_invoke(&self, invocation: &mut Invocation) -> Result<(), InterceptError> {
            self.log.lock().push(format!("{}-after", self.label));
            *self.observed.lock() = invocation.return_value().as_value().cloned();
            if let Some(value) = &self.overwrite {
                invocation.set_return_value(value.clone());
            }
            if self.fail_after {
                return Err(InterceptError::new("after hook failed"));
            }
            Ok(())
        }

        fn after_completion(
            &self,
            _invocation: &mut Invocation,
            completion: &DeferredOutput,
        ) -> Result<(), InterceptError> {
            self.log
                .lock()
                .push(format!("{}-done:{}", self.label, completion.is_ok()));
            Ok(())
        }

        fn name(&self) -> &str {
            self.label
        }
    }

    fn deferred_request(
        returns: ReturnType,
        log: Log,
        calls: Arc<AtomicUsize>,
        outcome: DeferredOutput,
    ) -> Arc<ProxyRequest> {
        let method = MethodIdentity::of::<Worker>("run").returning(returns);
        let target = invoke_fn(move |_: &MethodIdentity, _: &[TypeKey], _: &[Value]| {
            calls.fetch_add(1, Ordering::SeqCst);
            let log = Arc::clone(&log);
            let outcome = outcome.clone();
            Ok(ReturnValue::Deferred(DeferredHandle::new(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                log.lock().push("real".to_string());
                outcome
            })))
        });
        Arc::new(ProxyRequest::new(method, Vec::new(), Arc::new(target)))
    }

    fn invocation_for(
        request: Arc<ProxyRequest>,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Invocation {
        let shape = ReturnShape::classify(request.method().returns());
        Invocation::new(
            request,
            Arguments::default(),
            Arc::new(InterceptorChain::new(interceptors, shape)),
        )
    }

    #[test]
    fn immediate_hooks_wrap_proceed_on_calling_thread() {
        let log: Log = Arc::default();
        let target_log = Arc::clone(&log);
        let method = MethodIdentity::of::<Worker>("sum").returning(ReturnType::value::<i64>());
        let target = invoke_fn(move |_: &MethodIdentity, _: &[TypeKey], _: &[Value]| {
            target_log.lock().push("real".to_string());
            Ok(ReturnValue::Value(json!(7)))
        });
        let request = Arc::new(ProxyRequest::new(method, Vec::new(), Arc::new(target)));
        let recorder = Recorder::new("a", Arc::clone(&log));
        let observed = Arc::clone(&recorder.observed);
        let mut invocation = invocation_for(request, vec![Arc::new(Staged::new(recorder))]);

        invocation.proceed().unwrap();

        assert_eq!(*log.lock(), vec!["a-before", "real", "a-after"]);
        assert_eq!(*observed.lock(), Some(json!(7)));
        assert_eq!(invocation.return_value().as_value(), Some(&json!(7)));
    }

    #[test]
    fn immediate_failure_skips_after_invoke() {
        let log: Log = Arc::default();
        let method = MethodIdentity::of::<Worker>("explode");
        let target = invoke_fn(|_: &MethodIdentity, _: &[TypeKey], _: &[Value]| {
            Err(InterceptError::new("boom"))
        });
        let request = Arc::new(ProxyRequest::new(method, Vec::new(), Arc::new(target)));
        let staged = Staged::new(Recorder::new("a", Arc::clone(&log)));
        let mut invocation = invocation_for(request, vec![Arc::new(staged)]);

        let err = invocation.proceed().unwrap_err();

        assert_eq!(err, InterceptError::new("boom"));
        assert_eq!(*log.lock(), vec!["a-before"]);
    }

    #[tokio::test]
    async fn deferred_after_hooks_wait_for_completion() {
        let log: Log = Arc::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let request = deferred_request(ReturnType::Deferred, log.clone(), calls.clone(), Ok(None));
        let staged = Staged::new(Recorder::new("a", log.clone()))
            .with_scheduling(StageScheduling::Inline);
        let mut invocation = invocation_for(request, vec![Arc::new(staged)]);

        invocation.proceed().unwrap();
        let handle = invocation.return_value().as_deferred().cloned().unwrap();
        assert!(log.lock().is_empty());
        assert!(!handle.is_complete());

        assert_eq!(handle.await.unwrap(), None);
        assert_eq!(
            *log.lock(),
            vec!["a-before", "real", "a-after", "a-done:true"]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deferred_value_reaches_hooks_and_caller() {
        let log: Log = Arc::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let request = deferred_request(
            ReturnType::deferred_value::<i64>(),
            log.clone(),
            calls,
            Ok(Some(json!(42))),
        );
        let recorder = Recorder::new("a", log.clone());
        let observed = Arc::clone(&recorder.observed);
        let mut invocation = invocation_for(request, vec![Arc::new(Staged::new(recorder))]);

        invocation.proceed().unwrap();
        let outcome = invocation.take_return_value().resolve().await;

        assert_eq!(outcome.unwrap(), Some(json!(42)));
        assert_eq!(*observed.lock(), Some(json!(42)));
        assert_eq!(
            *log.lock(),
            vec!["a-before", "real", "a-after", "a-done:true"]
        );
    }

    #[tokio::test]
    async fn after_hook_can_replace_deferred_value() {
        let log: Log = Arc::default();
        let request = deferred_request(
            ReturnType::deferred_value::<i64>(),
            log.clone(),
            Arc::default(),
            Ok(Some(json!(42))),
        );
        let mut recorder = Recorder::new("a", log);
        recorder.overwrite = Some(json!(43));
        let mut invocation = invocation_for(request, vec![Arc::new(Staged::new(recorder))]);

        invocation.proceed().unwrap();

        assert_eq!(
            invocation.take_return_value().resolve().await.unwrap(),
            Some(json!(43))
        );
    }

    #[tokio::test]
    async fn deferred_failure_reaches_hooks_and_handle() {
        let log: Log = Arc::default();
        let request = deferred_request(
            ReturnType::deferred_value::<i64>(),
            log.clone(),
            Arc::default(),
            Err(InterceptError::new("boom")),
        );
        let mut invocation =
            invocation_for(request, vec![Arc::new(Staged::new(Recorder::new("a", log.clone())))]);

        invocation.proceed().unwrap();
        let err = invocation.take_return_value().resolve().await.unwrap_err();

        assert_eq!(err, InterceptError::new("boom"));
        assert_eq!(
            *log.lock(),
            vec!["a-before", "real", "a-after", "a-done:false"]
        );
    }

    #[tokio::test]
    async fn after_hook_value_does_not_recover_deferred_failure() {
        let log: Log = Arc::default();
        let request = deferred_request(
            ReturnType::deferred_value::<i64>(),
            log.clone(),
            Arc::default(),
            Err(InterceptError::new("boom")),
        );
        let mut recorder = Recorder::new("a", log.clone());
        recorder.overwrite = Some(json!(0));
        let mut invocation = invocation_for(request, vec![Arc::new(Staged::new(recorder))]);

        invocation.proceed().unwrap();
        let err = invocation.take_return_value().resolve().await.unwrap_err();

        assert_eq!(err, InterceptError::new("boom"));
        assert!(log.lock().contains(&"a-after".to_string()));
    }

    #[tokio::test]
    async fn failing_after_hook_chains_in_flight_failure() {
        let log: Log = Arc::default();
        let request = deferred_request(
            ReturnType::Deferred,
            log.clone(),
            Arc::default(),
            Err(InterceptError::new("boom")),
        );
        let mut recorder = Recorder::new("a", log.clone());
        recorder.fail_after = true;
        let mut invocation = invocation_for(request, vec![Arc::new(Staged::new(recorder))]);

        invocation.proceed().unwrap();
        let err = invocation.take_return_value().resolve().await.unwrap_err();

        assert!(matches!(err, InterceptError::Chained { .. }));
        assert_eq!(err.root_cause(), &InterceptError::new("boom"));
        assert!(log.lock().contains(&"a-done:false".to_string()));
    }

    #[tokio::test]
    async fn failing_before_hook_skips_the_call() {
        let log: Log = Arc::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let request = deferred_request(ReturnType::Deferred, log.clone(), calls.clone(), Ok(None));
        let mut recorder = Recorder::new("a", log.clone());
        recorder.fail_before = true;
        let mut invocation = invocation_for(request, vec![Arc::new(Staged::new(recorder))]);

        invocation.proceed().unwrap();
        let err = invocation.take_return_value().resolve().await.unwrap_err();

        assert_eq!(err, InterceptError::new("denied"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(*log.lock(), vec!["a-before"]);
    }

    #[tokio::test]
    async fn nested_stages_unwind_in_reverse_order() {
        let log: Log = Arc::default();
        let request = deferred_request(
            ReturnType::deferred_value::<i64>(),
            log.clone(),
            Arc::default(),
            Ok(Some(json!(1))),
        );
        let mut invocation = invocation_for(
            request,
            vec![
                Arc::new(Staged::new(Recorder::new("a", log.clone()))),
                Arc::new(Staged::new(Recorder::new("b", log.clone()))),
            ],
        );

        invocation.proceed().unwrap();
        let value = invocation.take_return_value().resolve().await.unwrap();

        assert_eq!(value, Some(json!(1)));
        assert_eq!(
            *log.lock(),
            vec![
                "a-before", "b-before", "real", "b-after", "b-done:true", "a-after",
                "a-done:true"
            ]
        );
    }
}
