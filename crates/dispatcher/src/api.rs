use std::sync::{Arc, Weak};

use dashmap::DashMap;
use interpose_core_types::{InterceptError, MethodIdentity, TypeKey, Value};
use interpose_invocation::{
    Arguments, InterceptorChain, Invocation, Invokable, ProxyRequest, ReturnValue,
};
use tracing::{debug, debug_span, trace};

use crate::chain::ChainBuilder;
use crate::error::DispatchError;
use crate::metrics;

/// One call routed from a proxy stub into the dispatcher.
pub struct DispatchCall {
    pub method: MethodIdentity,
    pub type_arguments: Vec<TypeKey>,
    pub arguments: Vec<Value>,
    pub target: Arc<dyn Invokable>,
}

impl DispatchCall {
    pub fn new(method: MethodIdentity, target: Arc<dyn Invokable>) -> Self {
        Self {
            method,
            type_arguments: Vec::new(),
            arguments: Vec::new(),
            target,
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<Value>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_type_arguments(mut self, type_arguments: Vec<TypeKey>) -> Self {
        self.type_arguments = type_arguments;
        self
    }
}

/// Cache key for chains resolved by [`Dispatcher::dispatch`]: the method
/// plus the address of the target instance.
#[derive(Clone, PartialEq, Eq, Hash)]
struct ChainKey {
    method: MethodIdentity,
    target: usize,
}

impl ChainKey {
    fn of(request: &ProxyRequest) -> Self {
        Self {
            method: request.method().clone(),
            target: target_address(request.target()),
        }
    }
}

fn target_address(target: &Arc<dyn Invokable>) -> usize {
    Arc::as_ptr(target) as *const () as usize
}

struct CachedChain {
    target: Weak<dyn Invokable>,
    chain: Arc<InterceptorChain>,
}

impl CachedChain {
    /// The `Weak` pins the allocation, so a live entry's address cannot be
    /// reused by another instance.
    fn is_live(&self) -> bool {
        self.target.strong_count() > 0
    }
}

/// Entry point for every intercepted call.
///
/// Chains resolved through [`Dispatcher::dispatch`] are cached per method
/// and target instance when `cache_chains` is on, so request predicates are
/// evaluated once for each pair. Entries for dropped targets are pruned on
/// the next miss. Proxies created with `Dispatcher::create_proxy` resolve
/// their own chains.
pub struct Dispatcher {
    builder: ChainBuilder,
    chains: DashMap<ChainKey, CachedChain>,
    cache_chains: bool,
}

impl Dispatcher {
    pub fn new(builder: ChainBuilder) -> Self {
        Self {
            builder,
            chains: DashMap::new(),
            cache_chains: true,
        }
    }

    pub fn with_chain_cache(mut self, enabled: bool) -> Self {
        self.cache_chains = enabled;
        self
    }

    pub fn builder(&self) -> &ChainBuilder {
        &self.builder
    }

    pub fn cached_chains(&self) -> usize {
        self.chains.len()
    }

    pub fn chain_for(&self, request: &ProxyRequest) -> Arc<InterceptorChain> {
        if !self.cache_chains {
            return self.builder.build(request);
        }
        let key = ChainKey::of(request);
        if let Some(cached) = self.chains.get(&key) {
            if cached.is_live() {
                return Arc::clone(&cached.chain);
            }
        }
        self.chains.retain(|_, cached| cached.is_live());
        let chain = self.builder.build(request);
        self.chains.insert(
            key,
            CachedChain {
                target: Arc::downgrade(request.target()),
                chain: Arc::clone(&chain),
            },
        );
        chain
    }

    pub fn dispatch(&self, call: DispatchCall) -> Result<ReturnValue, InterceptError> {
        let request = Arc::new(ProxyRequest::new(
            call.method,
            call.type_arguments,
            call.target,
        ));
        let chain = self.chain_for(&request);
        self.invoke(request, chain, call.arguments)
    }

    /// Runs one call through an already resolved chain.
    ///
    /// The result is whatever the top of the chain left in the return slot.
    /// A slot left in the failed state is reported as an error even when the
    /// interceptor that saw the failure returned normally.
    pub fn invoke(
        &self,
        request: Arc<ProxyRequest>,
        chain: Arc<InterceptorChain>,
        arguments: Vec<Value>,
    ) -> Result<ReturnValue, InterceptError> {
        validate(&request, &arguments)?;
        let shape = chain.shape();
        let mut invocation = Invocation::new(request, Arguments::new(arguments), chain);
        let span = debug_span!(
            "intercept",
            method = %invocation.method(),
            invocation = %invocation.id()
        );
        let _entered = span.enter();
        metrics::record_dispatch(shape);
        trace!(interceptors = invocation.chain().len(), shape = shape.label(), "dispatching");

        let outcome = invocation
            .proceed()
            .and_then(|()| match invocation.take_return_value() {
                ReturnValue::Failed(err) => Err(err),
                value => Ok(value),
            });
        if let Err(err) = &outcome {
            metrics::record_failure(shape);
            debug!(%err, "intercepted call failed");
        }
        outcome
    }
}

fn validate(request: &ProxyRequest, arguments: &[Value]) -> Result<(), DispatchError> {
    let method = request.method();
    if arguments.len() != method.parameter_types().len() {
        return Err(DispatchError::ArgumentCount {
            method: method.to_string(),
            expected: method.parameter_types().len(),
            actual: arguments.len(),
        });
    }
    if request.type_arguments().len() != method.generic_arity() {
        return Err(DispatchError::TypeArgumentCount {
            method: method.to_string(),
            expected: method.generic_arity(),
            actual: request.type_arguments().len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use interpose_invocation::{intercept_fn, invoke_fn, Interceptor};
    use interpose_policy_center::PolicyTable;
    use interpose_registry::{InterceptorRegistry, MethodInterceptorRegistry};
    use parking_lot::Mutex;
    use serde_json::json;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Calculator;

    fn add_method() -> MethodIdentity {
        MethodIdentity::of::<Calculator>("add")
            .param_of::<i64>()
            .param_of::<i64>()
            .returning(interpose_core_types::ReturnType::value::<i64>())
    }

    fn calculator(log: Log) -> Arc<dyn Invokable> {
        Arc::new(invoke_fn(
            move |_: &MethodIdentity, _: &[TypeKey], args: &[Value]| {
                log.lock().push("<real-call>".to_string());
                let sum = args.iter().filter_map(Value::as_i64).sum::<i64>();
                Ok(ReturnValue::Value(json!(sum)))
            },
        ))
    }

    fn recorder(label: &'static str, log: Log) -> Arc<dyn Interceptor> {
        Arc::new(intercept_fn(label, move |invocation: &mut Invocation| {
            log.lock().push(format!("{label}-before"));
            invocation.proceed()?;
            log.lock().push(format!("{label}-after"));
            Ok(())
        }))
    }

    fn call(log: &Log) -> DispatchCall {
        call_on(calculator(Arc::clone(log)))
    }

    fn call_on(target: Arc<dyn Invokable>) -> DispatchCall {
        DispatchCall::new(add_method(), target).with_arguments(vec![json!(2), json!(3)])
    }

    #[test]
    fn hooks_nest_by_ascending_order() {
        let log: Log = Arc::default();
        let registry = Arc::new(MethodInterceptorRegistry::new());
        registry.add(add_method(), recorder("C", log.clone()), 3);
        registry.add(add_method(), recorder("A", log.clone()), 1);
        registry.add(add_method(), recorder("B", log.clone()), 2);
        let dispatcher = Dispatcher::new(ChainBuilder::without_policy(registry));

        let value = dispatcher.dispatch(call(&log)).unwrap();

        assert_eq!(value.as_value(), Some(&json!(5)));
        assert_eq!(
            *log.lock(),
            vec![
                "A-before",
                "B-before",
                "C-before",
                "<real-call>",
                "C-after",
                "B-after",
                "A-after"
            ]
        );
    }

    #[test]
    fn argument_rewrites_reach_the_target() {
        let log: Log = Arc::default();
        let policy = Arc::new(PolicyTable::new());
        policy.intercept(|_| true).with(Arc::new(intercept_fn(
            "double-first",
            |invocation: &mut Invocation| {
                let first = invocation.arguments().get(0).and_then(|v| v.as_i64()).unwrap_or(0);
                invocation.arguments().set(0, json!(first * 2))?;
                invocation.proceed()
            },
        )));
        let dispatcher = Dispatcher::new(ChainBuilder::new(
            Arc::new(MethodInterceptorRegistry::new()),
            policy,
        ));

        let value = dispatcher.dispatch(call(&log)).unwrap();

        assert_eq!(value.as_value(), Some(&json!(7)));
    }

    #[test]
    fn target_failure_propagates_through_the_chain() {
        let log: Log = Arc::default();
        let registry = Arc::new(MethodInterceptorRegistry::new());
        registry.add(add_method(), recorder("A", log.clone()), 0);
        let dispatcher = Dispatcher::new(ChainBuilder::without_policy(registry));
        let failing = Arc::new(invoke_fn(|_: &MethodIdentity, _: &[TypeKey], _: &[Value]| {
            Err(InterceptError::new("overflow"))
        }));

        let err = dispatcher
            .dispatch(
                DispatchCall::new(add_method(), failing).with_arguments(vec![json!(1), json!(1)]),
            )
            .unwrap_err();

        assert_eq!(err, InterceptError::new("overflow"));
        assert_eq!(*log.lock(), vec!["A-before"]);
    }

    #[test]
    fn swallowed_failure_without_replacement_is_still_an_error() {
        let registry = Arc::new(MethodInterceptorRegistry::new());
        registry.add(
            add_method(),
            Arc::new(intercept_fn("swallow", |invocation: &mut Invocation| {
                let _ = invocation.proceed();
                Ok(())
            })),
            0,
        );
        let dispatcher = Dispatcher::new(ChainBuilder::without_policy(registry));
        let failing = Arc::new(invoke_fn(|_: &MethodIdentity, _: &[TypeKey], _: &[Value]| {
            Err(InterceptError::new("overflow"))
        }));

        let err = dispatcher
            .dispatch(
                DispatchCall::new(add_method(), failing).with_arguments(vec![json!(1), json!(1)]),
            )
            .unwrap_err();

        assert_eq!(err, InterceptError::new("overflow"));
    }

    #[test]
    fn chains_are_cached_per_method_and_target() {
        let log: Log = Arc::default();
        let registry = Arc::new(MethodInterceptorRegistry::new());
        registry.add(add_method(), recorder("A", log.clone()), 0);
        let dispatcher = Dispatcher::new(ChainBuilder::without_policy(registry.clone()));
        let target = calculator(log.clone());

        dispatcher.dispatch(call_on(target.clone())).unwrap();
        registry.add(add_method(), recorder("late", log.clone()), 1);
        log.lock().clear();
        dispatcher.dispatch(call_on(target.clone())).unwrap();

        assert_eq!(dispatcher.cached_chains(), 1);
        assert_eq!(*log.lock(), vec!["A-before", "<real-call>", "A-after"]);
    }

    #[test]
    fn target_predicates_are_decided_per_instance() {
        let log: Log = Arc::default();
        let plain = calculator(log.clone());
        let special = calculator(log.clone());
        let special_address = target_address(&special);
        let policy = Arc::new(PolicyTable::new());
        policy
            .intercept(move |request| target_address(request.target()) == special_address)
            .with(recorder("audit", log.clone()));
        let dispatcher = Dispatcher::new(ChainBuilder::new(
            Arc::new(MethodInterceptorRegistry::new()),
            policy,
        ));

        dispatcher.dispatch(call_on(plain.clone())).unwrap();
        assert_eq!(*log.lock(), vec!["<real-call>"]);
        log.lock().clear();

        dispatcher.dispatch(call_on(special.clone())).unwrap();
        assert_eq!(*log.lock(), vec!["audit-before", "<real-call>", "audit-after"]);
        log.lock().clear();

        dispatcher.dispatch(call_on(plain)).unwrap();
        assert_eq!(*log.lock(), vec!["<real-call>"]);
        assert_eq!(dispatcher.cached_chains(), 2);
    }

    #[test]
    fn dropped_targets_leave_the_cache() {
        let log: Log = Arc::default();
        let dispatcher =
            Dispatcher::new(ChainBuilder::without_policy(Arc::new(MethodInterceptorRegistry::new())));
        let kept = calculator(log.clone());

        dispatcher.dispatch(call(&log)).unwrap();
        dispatcher.dispatch(call_on(kept.clone())).unwrap();

        assert_eq!(dispatcher.cached_chains(), 1);
    }

    #[test]
    fn disabled_cache_rebuilds_each_call() {
        let log: Log = Arc::default();
        let registry = Arc::new(MethodInterceptorRegistry::new());
        let dispatcher =
            Dispatcher::new(ChainBuilder::without_policy(registry.clone())).with_chain_cache(false);

        dispatcher.dispatch(call(&log)).unwrap();
        registry.add(add_method(), recorder("late", log.clone()), 0);
        log.lock().clear();
        dispatcher.dispatch(call(&log)).unwrap();

        assert_eq!(dispatcher.cached_chains(), 0);
        assert_eq!(*log.lock(), vec!["late-before", "<real-call>", "late-after"]);
    }

    #[test]
    fn wrong_argument_count_is_rejected_before_the_chain() {
        let log: Log = Arc::default();
        let registry = Arc::new(MethodInterceptorRegistry::new());
        registry.add(add_method(), recorder("A", log.clone()), 0);
        let dispatcher = Dispatcher::new(ChainBuilder::without_policy(registry));

        let err = dispatcher
            .dispatch(call(&log).with_arguments(vec![json!(1)]))
            .unwrap_err();

        assert!(err.to_string().contains("takes 2 arguments, got 1"));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn short_circuit_without_value_returns_unset() {
        let log: Log = Arc::default();
        let registry = Arc::new(MethodInterceptorRegistry::new());
        registry.add(
            add_method(),
            Arc::new(intercept_fn("deny", |_: &mut Invocation| Ok(()))),
            0,
        );
        let dispatcher = Dispatcher::new(ChainBuilder::without_policy(registry));

        let value = dispatcher.dispatch(call(&log)).unwrap();

        assert!(value.is_unset());
        assert!(log.lock().is_empty());
    }
}
