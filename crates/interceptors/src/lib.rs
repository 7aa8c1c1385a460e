pub mod logging;
pub mod metrics;
pub mod staged;
pub mod timing;

pub use logging::LoggingInterceptor;
pub use staged::{Staged, StagedInterceptor};
pub use timing::TimingInterceptor;
