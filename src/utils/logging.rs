//! Structured logging configuration.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Initialise the global tracing subscriber from a [`LoggingConfig`].
///
/// `RUST_LOG` overrides the configured level when set. Safe to call more
/// than once; later calls are no-ops.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}={}",
            env!("CARGO_CRATE_NAME"),
            config.log_level
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    // A subscriber installed by the host application wins
    let _ = result;
}
