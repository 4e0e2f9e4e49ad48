//! Error types for the switchyard router.
//!
//! Two layers: [`ProviderError`] is what a single adapter call produces and is
//! always recovered inside the router; [`RouterError`] is what callers of the
//! router see.

use thiserror::Error;

/// Failure of a single adapter operation (one attempt against one provider).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Transport-level failure (connection reset, DNS, broken body).
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Backend answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code returned by the backend.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The call did not finish within the configured timeout.
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// Backend is not reachable at all.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Credentials were rejected or missing.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Backend answered but the payload could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The adapter does not implement the requested operation.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// A locally managed backend process failed.
    #[error("backend process error: {0}")]
    Process(String),
}

impl ProviderError {
    /// Whether retrying the same provider can plausibly succeed.
    ///
    /// Timeouts, connection failures, 429 and 5xx are transient. Credential
    /// failures, other 4xx, malformed payloads and unsupported operations
    /// fail the same way every time.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed(_) | Self::Timeout(_) | Self::Unavailable(_) | Self::Process(_) => {
                true
            }
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Authentication(_) | Self::InvalidResponse(_) | Self::Unsupported(_) => false,
        }
    }

    /// Build an error from an HTTP status and body, classifying auth failures.
    #[must_use]
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => Self::Authentication(format!("HTTP {status}: {body}")),
            _ => Self::Http { status, body },
        }
    }
}

/// Errors surfaced to callers of the router.
#[derive(Debug, Error)]
pub enum RouterError {
    /// No provider was eligible for the operation when the request started.
    #[error("no providers available for {operation}")]
    NoProvidersAvailable {
        /// `complete`, `stream` or `embed`.
        operation: &'static str,
    },

    /// Every candidate failed; carries the last underlying cause.
    #[error("all providers failed for {operation} after {attempts} attempts: {last_error}")]
    Exhausted {
        /// `complete`, `stream` or `embed`.
        operation: &'static str,
        /// Total adapter calls made for this request.
        attempts: u32,
        /// The final error observed.
        last_error: ProviderError,
    },

    /// A provider with the same name is already registered.
    #[error("duplicate provider name: {0}")]
    DuplicateProvider(String),

    /// Configuration could not be parsed or is out of range.
    #[error("configuration error: {0}")]
    Config(String),

    /// The router was shut down.
    #[error("router has been shut down")]
    ShutDown,

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(ProviderError::Timeout(100).is_retryable());
        assert!(ProviderError::Unavailable("refused".into()).is_retryable());
        assert!(ProviderError::from_status(503, "busy").is_retryable());
        assert!(ProviderError::from_status(429, "slow down").is_retryable());
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(!ProviderError::from_status(401, "bad key").is_retryable());
        assert!(!ProviderError::from_status(404, "no model").is_retryable());
        assert!(!ProviderError::InvalidResponse("garbage".into()).is_retryable());
    }

    #[test]
    fn auth_statuses_classified() {
        assert!(matches!(
            ProviderError::from_status(403, "forbidden"),
            ProviderError::Authentication(_)
        ));
    }

    #[test]
    fn exhausted_message_embeds_last_cause() {
        let err = RouterError::Exhausted {
            operation: "complete",
            attempts: 4,
            last_error: ProviderError::Timeout(250),
        };
        let msg = err.to_string();
        assert!(msg.contains("4 attempts"));
        assert!(msg.contains("timed out after 250ms"));
    }
}
