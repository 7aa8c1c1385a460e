use std::collections::HashMap;
use std::sync::Arc;

use interpose_invocation::{Interceptor, ProxyRequest};
use tracing::info;

use crate::api::PolicyTable;
use crate::errors::PolicyError;
use crate::model::RuleSpec;

pub type CatalogFactory =
    Arc<dyn Fn(&RuleSpec, &ProxyRequest) -> Arc<dyn Interceptor> + Send + Sync>;

/// Named interceptor factories that configured rules refer to.
#[derive(Clone, Default)]
pub struct InterceptorCatalog {
    factories: HashMap<String, CatalogFactory>,
}

impl InterceptorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&RuleSpec, &ProxyRequest) -> Arc<dyn Interceptor> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Registers one interceptor instance shared by every matching call site.
    pub fn register_shared(
        &mut self,
        name: impl Into<String>,
        interceptor: Arc<dyn Interceptor>,
    ) -> &mut Self {
        self.register(name, move |_, _| Arc::clone(&interceptor))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Adds one table rule per configured rule. Nothing is installed if any
    /// rule names an interceptor missing from the catalog.
    pub fn install(&self, rules: &[RuleSpec], table: &PolicyTable) -> Result<usize, PolicyError> {
        if let Some(missing) = rules.iter().find(|rule| !self.contains(&rule.interceptor)) {
            return Err(PolicyError::UnknownInterceptor(missing.interceptor.clone()));
        }

        for rule in rules {
            let Some(factory) = self.factories.get(&rule.interceptor).cloned() else {
                continue;
            };
            let matcher = rule.clone();
            let spec = rule.clone();
            table
                .intercept(move |request| matcher.matches(request))
                .labeled(format!("config:{}", rule.interceptor))
                .with_factory(rule.order, move |request| factory(&spec, request));
        }
        info!(count = rules.len(), "configured interception rules installed");
        Ok(rules.len())
    }
}
