pub mod api;
pub mod chain;
pub mod error;
pub mod metrics;
pub mod proxy;

pub use api::{DispatchCall, Dispatcher};
pub use chain::ChainBuilder;
pub use error::DispatchError;
pub use proxy::{Proxy, ProxyHandle};
