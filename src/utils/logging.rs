//! Structured logging setup.
//!
//! Installs a `tracing-subscriber` fmt subscriber driven by [`LoggingConfig`].
//! `RUST_LOG` overrides the configured level when set.

use crate::config::LoggingConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Subsequent calls are no-ops.
pub fn init_logging(config: &LoggingConfig) {
    if !config.log_to_console {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_ascii_lowercase()));

    let installed = if config.json_format {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact()
            .try_init()
            .is_ok()
    };

    if installed {
        info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_noop() {
        let config = LoggingConfig::default();
        init_logging(&config);
        init_logging(&config);
    }
}
