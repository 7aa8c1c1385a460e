use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use interpose_core_types::MethodIdentity;
use interpose_dispatcher::{ChainBuilder, Dispatcher, ProxyHandle};
use interpose_interceptors::{LoggingInterceptor, TimingInterceptor};
use interpose_invocation::{Interceptor, Invokable, ProxyRequest, StageScheduling};
use interpose_policy_center::{
    default_snapshot, load_snapshot, InterceptorCatalog, PolicySnapshot, PolicyTable, RuleBuilder,
};
use interpose_registry::{InterceptorRegistry, MethodInterceptorRegistry};
use tracing::info;

/// Owns the registry, the policy table and the dispatcher built over them.
///
/// Bind interceptors first, then create proxies. Proxies resolve their
/// chains when they are created.
pub struct InterceptionKernel {
    snapshot: PolicySnapshot,
    registry: Arc<MethodInterceptorRegistry>,
    policy: Arc<PolicyTable>,
    dispatcher: Arc<Dispatcher>,
}

impl InterceptionKernel {
    pub fn new() -> Result<Self> {
        Self::from_snapshot(default_snapshot())
    }

    /// Loads configuration from `config_path` or the discovered default
    /// location and installs its rules with the builtin catalog.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = discover_config_path(config_path);
        let snapshot = load_snapshot(path.as_deref()).with_context(|| match &path {
            Some(path) => format!("Failed to load interception policy from {}", path.display()),
            None => "Failed to load interception policy".to_string(),
        })?;
        Self::from_snapshot(snapshot)
    }

    pub fn from_snapshot(snapshot: PolicySnapshot) -> Result<Self> {
        let catalog = builtin_catalog(snapshot.dispatch.scheduling);
        Self::with_catalog(snapshot, &catalog)
    }

    pub fn with_catalog(snapshot: PolicySnapshot, catalog: &InterceptorCatalog) -> Result<Self> {
        let registry = Arc::new(MethodInterceptorRegistry::new());
        let policy = Arc::new(PolicyTable::new());
        let installed = catalog
            .install(&snapshot.rules, &policy)
            .context("Failed to install configured interception rules")?;

        let builder = ChainBuilder::new(registry.clone(), policy.clone());
        let dispatcher =
            Arc::new(Dispatcher::new(builder).with_chain_cache(snapshot.dispatch.cache_chains));
        info!(
            rev = snapshot.rev,
            rules = installed,
            scheduling = ?snapshot.dispatch.scheduling,
            "interception kernel ready"
        );
        Ok(Self {
            snapshot,
            registry,
            policy,
            dispatcher,
        })
    }

    pub fn snapshot(&self) -> &PolicySnapshot {
        &self.snapshot
    }

    pub fn scheduling(&self) -> StageScheduling {
        self.snapshot.dispatch.scheduling
    }

    pub fn registry(&self) -> &Arc<MethodInterceptorRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &Arc<PolicyTable> {
        &self.policy
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Registers a static binding for one method.
    pub fn add(&self, method: MethodIdentity, interceptor: Arc<dyn Interceptor>, order: i32) {
        self.registry.add(method, interceptor, order);
    }

    /// Starts a predicate binding: `kernel.intercept(|req| ..).with(interceptor)`.
    pub fn intercept<P>(&self, predicate: P) -> RuleBuilder<'_>
    where
        P: Fn(&ProxyRequest) -> bool + Send + Sync + 'static,
    {
        self.policy.intercept(predicate)
    }

    /// Ends the build phase of the static registry.
    pub fn seal(&self) {
        self.registry.seal();
    }

    pub fn create_proxy<I>(&self, target: Arc<dyn Invokable>, declared_methods: I) -> ProxyHandle
    where
        I: IntoIterator<Item = MethodIdentity>,
    {
        self.dispatcher.create_proxy(target, declared_methods)
    }
}

/// Catalog with the stock interceptors under `logging` and `timing`.
pub fn builtin_catalog(scheduling: StageScheduling) -> InterceptorCatalog {
    let mut catalog = InterceptorCatalog::new();
    catalog.register_shared("logging", Arc::new(LoggingInterceptor::staged(scheduling)));
    catalog.register_shared("timing", Arc::new(TimingInterceptor));
    catalog
}

/// Explicit path, else `./config/interpose.yaml`, else the user config dir.
pub fn discover_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("config/interpose.yaml");
    if local.exists() {
        return Some(local);
    }
    let mut path = dirs::config_dir()?;
    path.push("interpose");
    path.push("interpose.yaml");
    path.exists().then_some(path)
}
