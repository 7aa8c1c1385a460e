use interpose_core_types::{InterceptError, TypeKey};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("type not registered: {0}")]
    NotFound(TypeKey),
}

impl RegistryError {
    pub fn into_intercept_error(self) -> InterceptError {
        match self {
            RegistryError::NotFound(ty) => InterceptError::RegistryLookup(ty.0),
        }
    }
}

impl From<RegistryError> for InterceptError {
    fn from(value: RegistryError) -> Self {
        value.into_intercept_error()
    }
}
