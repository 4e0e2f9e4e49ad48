//! Tracing subscriber bootstrap for binaries and tests.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Result, RouterError};

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Returns `Ok(false)` if a
/// global subscriber was already installed.
///
/// # Errors
/// Returns `RouterError::Config` if the level directive cannot be parsed.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| RouterError::Config(format!("invalid log level '{}': {e}", config.level)))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_current_span(false)).try_init(),
    };
    Ok(installed.is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_reports_false() {
        let config = LoggingConfig::default();
        let first = init_tracing(&config).expect("valid level");
        let second = init_tracing(&config).expect("valid level");
        assert!(!second);
        // Another test in this binary may have installed one first.
        let _ = first;
    }

    #[test]
    fn bad_level_is_config_error() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            level: "switchyard=loudest".into(),
            ..LoggingConfig::default()
        };
        assert!(matches!(init_tracing(&config), Err(RouterError::Config(_))));
    }
}
