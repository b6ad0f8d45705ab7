//! Log output for the console binary.
//!
//! The library logs through the `log` facade; `init_logging` installs a
//! `tracing-subscriber` that also captures those records.

use crate::error::{ClientError, ClientResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Verbosity 0=warn, 1=info, 2=debug, 3+=trace
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber on stderr. `RUST_LOG` overrides `verbosity`.
pub fn init_logging(verbosity: u8, format: LogFormat) -> ClientResult<()> {
    let level = level_for(verbosity);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("droplite={}", level)));

    let installed = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbosity >= 2),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };

    installed.map_err(|e| ClientError::Config(format!("Failed to initialize logging: {}", e)))
}
