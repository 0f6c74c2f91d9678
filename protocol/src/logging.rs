//! # Structured Logging
//!
//! Sets up the `tracing` subscriber for whoever embeds the ledger and the
//! distributor. The library crates only emit events through `tracing`
//! macros and never install a subscriber themselves; the embedder reads
//! the `logging` section of its `RuntimeConfig` and calls
//! [`LoggingConfig::try_init`] once.
//!
//! `RUST_LOG` always wins over the configured level:
//!
//! ```text
//! RUST_LOG=redpacket_contracts=debug,redpacket_protocol=info
//! ```

use serde::{Deserialize, Serialize};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor a config sets one.
pub const DEFAULT_LOG_FILTER: &str = "redpacket_contracts=info,redpacket_protocol=info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output with file and line, for local development.
    Pretty,
    /// JSON lines for log aggregation.
    Json,
}

/// The `logging` section of a deployment config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingConfig {
    /// Installs the global subscriber. An already installed subscriber is
    /// reported as an error, so test suites can call this from every test.
    pub fn try_init(&self) -> Result<(), TryInitError> {
        try_init_logging(&self.filter, self.format)
    }
}

/// Installs a subscriber with `default_filter` unless `RUST_LOG` is set.
pub fn try_init_logging(default_filter: &str, format: LogFormat) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()?,
    }

    tracing::info!(?format, "logging initialized");
    Ok(())
}
