//! Logging setup using `tracing` + `tracing-subscriber`, rendered through
//! `tracing-indicatif` so that running tasks show up as spinners.
//!
//! Priority for determining the filter:
//! 1. `--log-level` flag
//! 2. `KUMITATE_LOG` environment variable, any `EnvFilter` directive
//! 3. `info`

use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "KUMITATE_LOG";

fn filter(level: Option<LogLevel>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::new(level.as_str()),
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(level: Option<LogLevel>) -> Result<(), TryInitError> {
    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(filter(level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(indicatif_layer.get_stderr_writer())
                .with_target(false),
        )
        .with(indicatif_layer)
        .try_init()
}
