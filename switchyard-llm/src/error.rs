//! Backend error types.

use switchyard_core::ProviderError;
use thiserror::Error;

/// Errors that can occur while constructing an adapter.
///
/// Per-call failures are [`ProviderError`]s; these only happen at build time,
/// before an adapter is handed to the router.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A required setting is absent from the provider table and environment.
    #[error("provider '{provider}' is missing setting '{setting}'")]
    MissingSetting {
        /// Provider name.
        provider: String,
        /// Setting key.
        setting: &'static str,
    },

    /// Settings table could not be deserialized for this kind.
    #[error("invalid settings for provider '{provider}': {source}")]
    InvalidSettings {
        /// Provider name.
        provider: String,
        /// Deserialization failure.
        source: toml::de::Error,
    },

    /// Local backend process could not be started.
    #[error("failed to spawn backend process: {0}")]
    Spawn(#[from] std::io::Error),

    /// HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Map a transport-level `reqwest` failure onto a per-call error.
///
/// The only deadline the shared client sets is its connect timeout; request
/// deadlines belong to the router, which reports them as `Timeout`.
pub(crate) fn transport_error(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Unavailable(format!("connect timed out: {err}"))
    } else if err.is_connect() {
        ProviderError::Unavailable(err.to_string())
    } else if err.is_decode() {
        ProviderError::InvalidResponse(err.to_string())
    } else {
        ProviderError::RequestFailed(err.to_string())
    }
}
