use std::fmt;
use std::hash::{Hash, Hasher};

use thiserror::Error;
use uuid::Uuid;

/// Dynamic value carried through an invocation as an argument or result.
pub type Value = serde_json::Value;

/// Shared failure type for every intercepted call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InterceptError {
    #[error("{message}")]
    Message { message: String },
    #[error("no interceptors registered for type {0}")]
    RegistryLookup(String),
    #[error("deferred call cancelled: {0}")]
    Cancelled(String),
    #[error("deferred stage panicked: {0}")]
    Panicked(String),
    #[error("{error} (while unwinding: {cause})")]
    Chained {
        error: Box<InterceptError>,
        #[source]
        cause: Box<InterceptError>,
    },
}

impl InterceptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    /// Replaces an in-flight failure with `self`, keeping the earlier one as the cause.
    pub fn chain(self, cause: InterceptError) -> Self {
        Self::Chained {
            error: Box::new(self),
            cause: Box::new(cause),
        }
    }

    pub fn root_cause(&self) -> &InterceptError {
        match self {
            Self::Chained { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TypeKey(pub String);

impl TypeKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn of<T: ?Sized>() -> Self {
        Self(std::any::type_name::<T>().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared result type of a method.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum ReturnType {
    #[default]
    Unit,
    Value(TypeKey),
    Deferred,
    DeferredValue(TypeKey),
}

impl ReturnType {
    pub fn value<T: ?Sized>() -> Self {
        Self::Value(TypeKey::of::<T>())
    }

    pub fn deferred_value<T: ?Sized>() -> Self {
        Self::DeferredValue(TypeKey::of::<T>())
    }
}

/// Invocation shape an interceptor must stage around.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ReturnShape {
    Immediate,
    Deferred,
    DeferredValue,
}

impl ReturnShape {
    pub fn classify(returns: &ReturnType) -> Self {
        match returns {
            ReturnType::Unit | ReturnType::Value(_) => ReturnShape::Immediate,
            ReturnType::Deferred => ReturnShape::Deferred,
            ReturnType::DeferredValue(_) => ReturnShape::DeferredValue,
        }
    }

    pub fn is_deferred(self) -> bool {
        !matches!(self, ReturnShape::Immediate)
    }

    pub fn label(self) -> &'static str {
        match self {
            ReturnShape::Immediate => "immediate",
            ReturnShape::Deferred => "deferred",
            ReturnShape::DeferredValue => "deferred_value",
        }
    }
}

/// Lookup key for a method: declaring type plus signature.
///
/// Equality and hashing cover the declaring type, name, parameter types and
/// generic arity. The declared return type travels with the identity so the
/// chain builder can classify the call shape, but it is not part of the key.
/// Type arguments of a generic instantiation are never part of the identity,
/// so every instantiation of an open method maps to the same key.
#[derive(Clone, Debug)]
pub struct MethodIdentity {
    declaring_type: TypeKey,
    name: String,
    parameter_types: Vec<TypeKey>,
    generic_arity: usize,
    returns: ReturnType,
}

impl MethodIdentity {
    pub fn new(declaring_type: TypeKey, name: impl Into<String>) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            parameter_types: Vec::new(),
            generic_arity: 0,
            returns: ReturnType::Unit,
        }
    }

    pub fn of<T: ?Sized>(name: impl Into<String>) -> Self {
        Self::new(TypeKey::of::<T>(), name)
    }

    pub fn param(mut self, ty: TypeKey) -> Self {
        self.parameter_types.push(ty);
        self
    }

    pub fn param_of<T: ?Sized>(self) -> Self {
        self.param(TypeKey::of::<T>())
    }

    pub fn generic(mut self, arity: usize) -> Self {
        self.generic_arity = arity;
        self
    }

    pub fn returning(mut self, returns: ReturnType) -> Self {
        self.returns = returns;
        self
    }

    pub fn declaring_type(&self) -> &TypeKey {
        &self.declaring_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_types(&self) -> &[TypeKey] {
        &self.parameter_types
    }

    pub fn generic_arity(&self) -> usize {
        self.generic_arity
    }

    pub fn returns(&self) -> &ReturnType {
        &self.returns
    }

    pub fn is_generic(&self) -> bool {
        self.generic_arity > 0
    }
}

impl PartialEq for MethodIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.declaring_type == other.declaring_type
            && self.name == other.name
            && self.parameter_types == other.parameter_types
            && self.generic_arity == other.generic_arity
    }
}

impl Eq for MethodIdentity {}

impl Hash for MethodIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.declaring_type.hash(state);
        self.name.hash(state);
        self.parameter_types.hash(state);
        self.generic_arity.hash(state);
    }
}

impl fmt::Display for MethodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)?;
        if self.generic_arity > 0 {
            write!(f, "<{}>", self.generic_arity)?;
        }
        let params = self
            .parameter_types
            .iter()
            .map(TypeKey::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "({params})")
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct InvocationId(pub String);

impl InvocationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ProxyId(pub String);

impl ProxyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ProxyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
