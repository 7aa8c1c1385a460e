use interpose_core_types::InterceptError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{method} takes {expected} arguments, got {actual}")]
    ArgumentCount {
        method: String,
        expected: usize,
        actual: usize,
    },
    #[error("{method} takes {expected} type arguments, got {actual}")]
    TypeArgumentCount {
        method: String,
        expected: usize,
        actual: usize,
    },
}

impl DispatchError {
    pub fn into_intercept_error(self) -> InterceptError {
        InterceptError::new(self.to_string())
    }
}

impl From<DispatchError> for InterceptError {
    fn from(value: DispatchError) -> Self {
        value.into_intercept_error()
    }
}
