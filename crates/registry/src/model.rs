use std::collections::HashMap;

use interpose_core_types::{MethodIdentity, TypeKey};
use interpose_invocation::InterceptorBinding;

/// Method-to-bindings table for one declaring type.
#[derive(Clone, Debug)]
pub struct MethodInterceptorCollection {
    declaring_type: TypeKey,
    methods: HashMap<MethodIdentity, Vec<InterceptorBinding>>,
}

impl MethodInterceptorCollection {
    pub fn new(declaring_type: TypeKey) -> Self {
        Self {
            declaring_type,
            methods: HashMap::new(),
        }
    }

    /// Appends a binding. Callers route methods by declaring type, so a
    /// method from another type never lands here.
    pub(crate) fn add(&mut self, method: MethodIdentity, binding: InterceptorBinding) {
        debug_assert_eq!(method.declaring_type(), &self.declaring_type);
        self.methods.entry(method).or_default().push(binding);
    }

    pub fn declaring_type(&self) -> &TypeKey {
        &self.declaring_type
    }

    pub fn get(&self, method: &MethodIdentity) -> &[InterceptorBinding] {
        self.methods
            .get(method)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, method: &MethodIdentity) -> bool {
        self.methods.contains_key(method)
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodIdentity> {
        self.methods.keys()
    }

    pub fn binding_count(&self) -> usize {
        self.methods.values().map(Vec::len).sum()
    }
}
