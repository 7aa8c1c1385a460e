pub mod api;
pub mod catalog;
pub mod defaults;
pub mod errors;
pub mod loader;
pub mod model;

pub use api::{InterceptionPolicySource, NoPolicy, PolicyTable, RuleBuilder};
pub use catalog::InterceptorCatalog;
pub use defaults::default_snapshot;
pub use errors::PolicyError;
pub use loader::{load_snapshot, load_snapshot_with_options, LoadOptions};
pub use model::{DispatchPolicy, LoggingPolicy, PolicySnapshot, PolicySource, RuleSpec};
