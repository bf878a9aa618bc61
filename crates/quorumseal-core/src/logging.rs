//! Logging bootstrap for applications embedding quorumseal.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! the application's choice. `RUST_LOG` takes precedence over the configured
//! level.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogConfig, LogFormat};
use crate::error::{SealError, SealResult};

/// Install a global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LogConfig) -> SealResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| SealError::Config(format!("invalid log level '{}': {e}", config.level)))?;

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init(),
    };

    result.map_err(|e| SealError::Config(format!("installing log subscriber: {e}")))
}
