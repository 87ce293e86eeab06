//! Error types for the client crate.

use thiserror::Error;

/// Errors surfaced to callers of the client APIs.
///
/// Reconnect failures never appear here; the push client absorbs them.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A configured URL could not be parsed or has the wrong scheme.
    #[error("invalid client url")]
    InvalidUrl {
        /// Offending value.
        value: String,
        /// Machine-readable reason.
        reason: &'static str,
    },
    /// The HTTP request for the bulk list failed.
    #[error("session fetch failed")]
    Fetch {
        /// Request URL.
        url: String,
        /// Underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },
}

/// Convenience alias for client results.
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    pub(crate) fn invalid_url(value: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidUrl {
            value: value.into(),
            reason,
        }
    }
}
