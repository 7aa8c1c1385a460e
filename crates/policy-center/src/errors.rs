use interpose_core_types::InterceptError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid policy: {0}")]
    Invalid(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("unsupported policy path: {0}")]
    UnsupportedPath(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("unknown interceptor: {0}")]
    UnknownInterceptor(String),
}

impl From<PolicyError> for InterceptError {
    fn from(value: PolicyError) -> Self {
        InterceptError::new(value.to_string())
    }
}
