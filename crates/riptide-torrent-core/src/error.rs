//! Error types for session orchestration.

use std::error::Error;

use riptide_events::ContentId;
use thiserror::Error;

/// Primary error type for session operations.
#[derive(Debug, Error)]
pub enum TorrentError {
    /// The operation referenced a content id with no record and no live handle.
    #[error("session not found")]
    NotFound {
        /// Missing content identifier.
        content_id: ContentId,
    },
    /// The record exists but carries neither a link nor a blob to reattach from.
    #[error("session has no source to resume from")]
    NoSource {
        /// Content identifier of the sourceless record.
        content_id: ContentId,
    },
    /// The supplied source could not be interpreted.
    #[error("invalid session source")]
    InvalidSource {
        /// Machine-readable reason.
        reason: &'static str,
    },
    /// The persisted status label was not recognised.
    #[error("invalid session status")]
    InvalidStatus {
        /// Offending label.
        value: String,
    },
    /// The engine rejected or failed an operation.
    #[error("engine operation failed")]
    EngineFailure {
        /// Operation identifier.
        operation: &'static str,
        /// Content identifier when known.
        content_id: Option<ContentId>,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Reading or writing the persistence store failed.
    #[error("session storage operation failed")]
    Storage {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl TorrentError {
    /// Wrap a storage failure with its operation label.
    pub fn storage(operation: &'static str, source: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Storage {
            operation,
            source: source.into(),
        }
    }

    /// Wrap an engine failure with its operation label.
    pub fn engine(
        operation: &'static str,
        content_id: Option<ContentId>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::EngineFailure {
            operation,
            content_id,
            source: source.into(),
        }
    }
}

/// Convenience alias for session operation results.
pub type TorrentResult<T> = Result<T, TorrentError>;
