pub mod api;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod state;

pub use api::InterceptorRegistry;
pub use errors::RegistryError;
pub use model::MethodInterceptorCollection;
pub use state::MethodInterceptorRegistry;
