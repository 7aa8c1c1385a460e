use std::sync::Arc;

use interpose_core_types::MethodIdentity;
use interpose_invocation::{Interceptor, InterceptorBinding, ProxyRequest};
use parking_lot::RwLock;
use serde_json::Value;

use crate::errors::PolicyError;
use crate::model::{PolicySnapshot, PolicySource, RuleSpec};

/// Supplies interceptors attached dynamically to a call site.
///
/// Queried once per proxy construction; bindings may come back unordered.
pub trait InterceptionPolicySource: Send + Sync {
    fn bindings_for(&self, request: &ProxyRequest) -> Vec<InterceptorBinding>;
}

impl<P> InterceptionPolicySource for Arc<P>
where
    P: InterceptionPolicySource + ?Sized,
{
    fn bindings_for(&self, request: &ProxyRequest) -> Vec<InterceptorBinding> {
        (**self).bindings_for(request)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoPolicy;

impl InterceptionPolicySource for NoPolicy {
    fn bindings_for(&self, _request: &ProxyRequest) -> Vec<InterceptorBinding> {
        Vec::new()
    }
}

pub type RequestPredicate = Arc<dyn Fn(&ProxyRequest) -> bool + Send + Sync>;
pub type InterceptorFactory = Arc<dyn Fn(&ProxyRequest) -> Arc<dyn Interceptor> + Send + Sync>;

#[derive(Clone)]
enum Provider {
    Shared(Arc<dyn Interceptor>),
    Factory(InterceptorFactory),
}

impl Provider {
    fn create(&self, request: &ProxyRequest) -> Arc<dyn Interceptor> {
        match self {
            Provider::Shared(interceptor) => Arc::clone(interceptor),
            Provider::Factory(factory) => factory(request),
        }
    }
}

struct PolicyRule {
    label: String,
    predicate: RequestPredicate,
    order: i32,
    provider: Provider,
}

/// Predicate-driven policy table populated at startup.
///
/// `table.intercept(|req| ..).with(interceptor)` attaches an interceptor to
/// every request the predicate accepts.
#[derive(Default)]
pub struct PolicyTable {
    rules: RwLock<Vec<PolicyRule>>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intercept<P>(&self, predicate: P) -> RuleBuilder<'_>
    where
        P: Fn(&ProxyRequest) -> bool + Send + Sync + 'static,
    {
        RuleBuilder {
            table: self,
            predicate: Arc::new(predicate),
            label: None,
        }
    }

    pub fn intercept_method(&self, method: MethodIdentity) -> RuleBuilder<'_> {
        let label = method.to_string();
        self.intercept(move |request| request.method() == &method)
            .labeled(label)
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.rules.read().iter().map(|r| r.label.clone()).collect()
    }

    fn push(&self, rule: PolicyRule) {
        self.rules.write().push(rule);
    }
}

impl InterceptionPolicySource for PolicyTable {
    fn bindings_for(&self, request: &ProxyRequest) -> Vec<InterceptorBinding> {
        self.rules
            .read()
            .iter()
            .filter(|rule| (rule.predicate)(request))
            .map(|rule| InterceptorBinding::new(rule.order, rule.provider.create(request)))
            .collect()
    }
}

pub struct RuleBuilder<'a> {
    table: &'a PolicyTable,
    predicate: RequestPredicate,
    label: Option<String>,
}

impl<'a> RuleBuilder<'a> {
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with(self, interceptor: Arc<dyn Interceptor>) {
        self.with_order(0, interceptor);
    }

    pub fn with_order(self, order: i32, interceptor: Arc<dyn Interceptor>) {
        let label = self
            .label
            .unwrap_or_else(|| interceptor.name().to_string());
        self.table.push(PolicyRule {
            label,
            predicate: self.predicate,
            order,
            provider: Provider::Shared(interceptor),
        });
    }

    /// Creates a fresh interceptor for each matching request.
    pub fn with_factory<F>(self, order: i32, factory: F)
    where
        F: Fn(&ProxyRequest) -> Arc<dyn Interceptor> + Send + Sync + 'static,
    {
        let label = self.label.unwrap_or_else(|| "factory".to_string());
        self.table.push(PolicyRule {
            label,
            predicate: self.predicate,
            order,
            provider: Provider::Factory(Arc::new(factory)),
        });
    }
}

pub(crate) fn apply_override_to_snapshot(
    snapshot: &mut PolicySnapshot,
    path: &str,
    value: &Value,
    source: PolicySource,
) -> Result<(), PolicyError> {
    match path {
        "rev" => snapshot.rev = to_u64(value)?,
        "dispatch.scheduling" => {
            snapshot.dispatch.scheduling = serde_json::from_value(value.clone())
                .map_err(|err| PolicyError::InvalidValue(format!("scheduling: {err}")))?
        }
        "dispatch.cache_chains" => snapshot.dispatch.cache_chains = to_bool(value)?,
        "logging.level" => snapshot.logging.level = to_string(value)?,
        "logging.json" => snapshot.logging.json = to_bool(value)?,
        "rules" => snapshot.rules = to_rules(value)?,
        path => return Err(PolicyError::UnsupportedPath(path.to_string())),
    }
    snapshot.set_provenance(path, source);
    Ok(())
}

fn to_u64(value: &Value) -> Result<u64, PolicyError> {
    value
        .as_u64()
        .ok_or_else(|| PolicyError::InvalidValue(format!("expected integer, got {value}")))
}

fn to_bool(value: &Value) -> Result<bool, PolicyError> {
    value
        .as_bool()
        .ok_or_else(|| PolicyError::InvalidValue(format!("expected bool, got {value}")))
}

fn to_string(value: &Value) -> Result<String, PolicyError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| PolicyError::InvalidValue(format!("expected string, got {value}")))
}

fn to_rules(value: &Value) -> Result<Vec<RuleSpec>, PolicyError> {
    serde_json::from_value(value.clone())
        .map_err(|err| PolicyError::InvalidValue(format!("rules: {err}")))
}
