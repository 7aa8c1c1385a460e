use std::sync::Arc;

use interpose_core_types::{InterceptError, Value};
use parking_lot::RwLock;

use crate::deferred::{DeferredHandle, DeferredOutput};

/// Return slot of an invocation.
#[derive(Clone, Debug, Default)]
pub enum ReturnValue {
    #[default]
    Unset,
    Void,
    Value(Value),
    Deferred(DeferredHandle),
    Failed(InterceptError),
}

impl ReturnValue {
    pub fn is_unset(&self) -> bool {
        matches!(self, ReturnValue::Unset)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ReturnValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_deferred(&self) -> Option<&DeferredHandle> {
        match self {
            ReturnValue::Deferred(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&InterceptError> {
        match self {
            ReturnValue::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Waits for the slot to settle, completing deferred handles.
    pub async fn resolve(self) -> DeferredOutput {
        match self {
            ReturnValue::Unset | ReturnValue::Void => Ok(None),
            ReturnValue::Value(value) => Ok(Some(value)),
            ReturnValue::Deferred(handle) => handle.await,
            ReturnValue::Failed(err) => Err(err),
        }
    }
}

impl From<Value> for ReturnValue {
    fn from(value: Value) -> Self {
        ReturnValue::Value(value)
    }
}

impl From<DeferredHandle> for ReturnValue {
    fn from(handle: DeferredHandle) -> Self {
        ReturnValue::Deferred(handle)
    }
}

/// Argument list shared by an invocation and all of its clones.
#[derive(Clone, Debug, Default)]
pub struct Arguments {
    values: Arc<RwLock<Vec<Value>>>,
}

impl Arguments {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values: Arc::new(RwLock::new(values)),
        }
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.values.read().get(index).cloned()
    }

    /// Replaces the argument at `index`, returning the previous value.
    pub fn set(&self, index: usize, value: Value) -> Result<Value, InterceptError> {
        let mut guard = self.values.write();
        let len = guard.len();
        let slot = guard.get_mut(index).ok_or_else(|| {
            InterceptError::new(format!("argument index {index} out of range ({len} arguments)"))
        })?;
        Ok(std::mem::replace(slot, value))
    }

    pub fn snapshot(&self) -> Vec<Value> {
        self.values.read().clone()
    }

    pub fn shares_storage_with(&self, other: &Arguments) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }
}

impl From<Vec<Value>> for Arguments {
    fn from(values: Vec<Value>) -> Self {
        Arguments::new(values)
    }
}
