//! Router configuration, loadable from TOML.
//!
//! ```toml
//! fallback_strategy = "priority"
//! max_retries = 3
//!
//! [logging]
//! level = "info"
//!
//! [[providers]]
//! name = "local-ollama"
//! kind = "ollama"
//! priority = 1
//! model = "qwen2.5-coder:7b"
//! ```
//!
//! Backend-specific keys live in the same `[[providers]]` table and are kept
//! verbatim in [`ProviderConfig::settings`]; the adapter crate interprets them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};
use crate::types::FallbackStrategy;

/// Top-level router configuration. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Provider definitions, in declaration order.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// How available providers are ordered per request.
    #[serde(default)]
    pub fallback_strategy: FallbackStrategy,
    /// Interval between background health-check rounds.
    #[serde(default = "default_30000")]
    pub health_check_interval_ms: u64,
    /// Attempts per candidate for `complete` (at least 1).
    #[serde(default = "default_3")]
    pub max_retries: u32,
    /// Upper bound for any single adapter call.
    #[serde(default = "default_30000")]
    pub timeout_ms: u64,
    /// First backoff delay; doubles per retry.
    #[serde(default = "default_1000")]
    pub backoff_base_ms: u64,
    /// Cap on a single backoff delay.
    #[serde(default = "default_30000")]
    pub max_backoff_ms: u64,
    /// Buffered events per subscriber before the slowest one starts lagging.
    #[serde(default = "default_256")]
    pub event_capacity: usize,
    /// Upper bound on each adapter's shutdown.
    #[serde(default = "default_5000")]
    pub shutdown_timeout_ms: u64,
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            fallback_strategy: FallbackStrategy::Priority,
            health_check_interval_ms: 30_000,
            max_retries: 3,
            timeout_ms: 30_000,
            backoff_base_ms: 1000,
            max_backoff_ms: 30_000,
            event_capacity: 256,
            shutdown_timeout_ms: 5000,
            logging: LoggingConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `RouterError::Config` if the TOML is invalid or out of range.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| RouterError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Reject values the router cannot operate with.
    ///
    /// # Errors
    /// Returns `RouterError::Config` describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(RouterError::Config("max_retries must be at least 1".into()));
        }
        if self.health_check_interval_ms == 0 {
            return Err(RouterError::Config(
                "health_check_interval_ms must be positive".into(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(RouterError::Config("timeout_ms must be positive".into()));
        }
        if self.event_capacity == 0 {
            return Err(RouterError::Config("event_capacity must be positive".into()));
        }
        Ok(())
    }

    /// Health-check interval.
    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    /// Per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Per-adapter shutdown bound.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Delay after the `attempt`-th failed attempt (1-based): base, 2×base, 4×base …
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.backoff_base_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

/// One configured provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique name.
    pub name: String,
    /// Backend kind, e.g. `ollama` or `llama_cpp`. Parsed when the router is built.
    pub kind: String,
    /// Disabled providers are ignored.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lower is preferred.
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Remaining backend-specific keys.
    #[serde(flatten)]
    pub settings: toml::Table,
}

impl ProviderConfig {
    /// Minimal provider entry with no backend settings.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            enabled: true,
            priority,
            settings: toml::Table::new(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level filter: trace, debug, info, warn, error. `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_priority() -> i32 { 100 }
fn default_log_level() -> String { "info".to_string() }
fn default_3() -> u32 { 3 }
fn default_256() -> usize { 256 }
fn default_1000() -> u64 { 1000 }
fn default_5000() -> u64 { 5000 }
fn default_30000() -> u64 { 30_000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config = RouterConfig::from_toml("").expect("parse");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.fallback_strategy, FallbackStrategy::Priority);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.providers.is_empty());
    }

    #[test]
    fn provider_settings_are_flattened() {
        let config = RouterConfig::from_toml(
            r#"
            fallback_strategy = "round_robin"
            max_retries = 2

            [[providers]]
            name = "ollama"
            kind = "ollama"
            priority = 1
            base_url = "http://localhost:11434"
            model = "qwen2.5-coder:7b"

            [[providers]]
            name = "groq"
            kind = "groq"
            enabled = false
            "#,
        )
        .expect("parse");

        assert_eq!(config.fallback_strategy, FallbackStrategy::RoundRobin);
        assert_eq!(config.providers.len(), 2);
        let ollama = &config.providers[0];
        assert_eq!(ollama.priority, 1);
        assert_eq!(
            ollama.settings.get("model").and_then(|v| v.as_str()),
            Some("qwen2.5-coder:7b")
        );
        assert!(!ollama.settings.contains_key("name"));
        assert!(!config.providers[1].enabled);
        assert_eq!(config.providers[1].priority, 100);
    }

    #[test]
    fn zero_retries_rejected() {
        let err = RouterConfig::from_toml("max_retries = 0").expect_err("should reject");
        assert!(matches!(err, RouterError::Config(_)));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = RouterConfig {
            backoff_base_ms: 1000,
            max_backoff_ms: 5000,
            ..RouterConfig::default()
        };
        assert_eq!(config.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(config.backoff_delay(4), Duration::from_secs(5));
        assert_eq!(config.backoff_delay(60), Duration::from_secs(5));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("switchyard.toml");
        std::fs::write(&path, "timeout_ms = 1500\n[logging]\nformat = \"json\"\n").expect("write");
        let config = RouterConfig::from_file(&path).expect("load");
        assert_eq!(config.timeout_ms, 1500);
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
