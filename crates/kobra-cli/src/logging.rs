//! Logging bootstrap for the `kobra` binary

use anyhow::{anyhow, Context, Result};
use kobra_core::LoggingConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` wins over `logging.level`.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("invalid log level `{}`", config.level))?,
    };

    let subscriber = fmt().with_env_filter(env_filter).with_target(false);

    let result = if config.format == "json" {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    result.map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}
