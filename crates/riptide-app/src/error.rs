//! # Design
//!
//! - Centralize application-level errors for bootstrap and session orchestration.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Environment configuration was missing.
    #[error("missing environment configuration")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: &'static str,
    },
    /// Configuration values were invalid.
    #[error("invalid configuration")]
    InvalidConfig {
        /// Field name that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Optional value associated with the failure.
        value: Option<String>,
    },
    /// API server operations failed.
    #[error("api server operation failed")]
    ApiServer {
        /// Operation identifier.
        operation: &'static str,
        /// Source API server error.
        source: riptide_api::ApiServerError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: riptide_telemetry::TelemetryError,
    },
    /// Session workflow operations failed.
    #[error("session operation failed")]
    Torrent {
        /// Operation identifier.
        operation: &'static str,
        /// Source session error.
        source: riptide_torrent_core::TorrentError,
    },
    /// Runtime persistence operations failed.
    #[error("runtime persistence failed")]
    Runtime {
        /// Operation identifier.
        operation: &'static str,
        /// Source persistence error.
        source: anyhow::Error,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
}

impl AppError {
    pub(crate) const fn api_server(
        operation: &'static str,
        source: riptide_api::ApiServerError,
    ) -> Self {
        Self::ApiServer { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: riptide_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn torrent(
        operation: &'static str,
        source: riptide_torrent_core::TorrentError,
    ) -> Self {
        Self::Torrent { operation, source }
    }

    pub(crate) const fn runtime(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Runtime { operation, source }
    }

    pub(crate) fn invalid(field: &'static str, reason: &'static str, value: &str) -> Self {
        Self::InvalidConfig {
            field,
            reason,
            value: Some(value.to_string()),
        }
    }
}
