use anyhow::{Context, Result};
use interpose_policy_center::LoggingPolicy;
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: OnceCell<()> = OnceCell::new();

/// Installs the global subscriber. `RUST_LOG` takes precedence over `level`.
///
/// Only the first call in a process has any effect.
pub fn init_logging(level: &str, json: bool) -> Result<()> {
    let level: tracing::Level = level.parse().context("Invalid log level")?;
    INIT.get_or_try_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
        tracing_subscriber::registry()
            .with(filter)
            .with(json.then(|| fmt::layer().json()))
            .with((!json).then(fmt::layer))
            .try_init()
            .context("Failed to install tracing subscriber")
    })?;
    Ok(())
}

pub fn init_from_policy(policy: &LoggingPolicy) -> Result<()> {
    init_logging(&policy.level, policy.json)
}
