//! Observability utilities for the dynamic tool runtime.
//!
//! Call [`init_tracing`] once at program start. `RUST_LOG` takes precedence
//! over the configured level; later calls are ignored.

#![warn(missing_docs, clippy::pedantic)]

use tool_config::LoggingConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Builds the filter used by [`init_tracing`]: `RUST_LOG` when set and
/// valid, otherwise `level`, otherwise `info`.
#[must_use]
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber described by `config`.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = env_filter(&config.level);
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_levels_fall_back() {
        let filter = env_filter("not a [valid] directive===");
        assert!(!filter.to_string().is_empty());
    }

    #[test]
    fn second_initialisation_is_ignored() {
        let config = LoggingConfig {
            level: "debug".into(),
            json: true,
        };
        init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
