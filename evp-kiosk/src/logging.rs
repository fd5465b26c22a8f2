//! Tracing setup for the kiosk binary

use evp_common::config::LoggingConfig;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{KioskError, Result};

/// Filter from `RUST_LOG`, else the configured level
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install the global subscriber
///
/// Logs go to stderr, or when `logging.file` is set, are appended to that
/// file without ANSI colours.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let (stderr_layer, file_layer) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(evp_common::Error::from)?;
            let layer = fmt::layer().with_writer(Mutex::new(file)).with_ansi(false);
            (None, Some(layer))
        }
        None => (Some(fmt::layer().with_writer(std::io::stderr)), None),
    };

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| {
            KioskError::Common(evp_common::Error::Internal(format!(
                "tracing already initialised: {}",
                e
            )))
        })
}
