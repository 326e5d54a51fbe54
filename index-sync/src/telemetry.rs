//! Tracing setup for the binary.
//!
//! The subscriber is installed before settings are loaded so configuration
//! errors are logged too. Once the settings are known, [`LogLevel::apply`]
//! swaps the filter for the configured level unless `RUST_LOG` was set.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use index_sync_core::config::DEFAULT_LOG_LEVEL;

/// Noisy dependencies stay at `warn` whatever the configured level.
const QUIET_DEPENDENCIES: &str = "aws_config=warn,aws_smithy_runtime=warn,hyper=warn,hyper_util=warn";

pub struct LogLevel {
    handle: reload::Handle<EnvFilter, Registry>,
    pinned_by_env: bool,
}

fn filter_for(level: &str) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
    EnvFilter::try_new(format!("{level},{QUIET_DEPENDENCIES}"))
}

pub fn init() -> LogLevel {
    let (filter, pinned_by_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (
            filter_for(DEFAULT_LOG_LEVEL).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)),
            false,
        ),
    };
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
    LogLevel {
        handle,
        pinned_by_env,
    }
}

impl LogLevel {
    pub fn apply(&self, level: &str) {
        if self.pinned_by_env {
            tracing::debug!(level, "RUST_LOG is set, ignoring configured log level");
            return;
        }
        match filter_for(level) {
            Ok(filter) => {
                if let Err(e) = self.handle.reload(filter) {
                    tracing::warn!(error = %e, "Failed to apply configured log level");
                }
            }
            Err(e) => tracing::warn!(level, error = %e, "Invalid log level, keeping default"),
        }
    }
}
