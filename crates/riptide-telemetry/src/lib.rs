#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! Telemetry primitives shared across the Riptide workspace.
//!
//! Centralises logging setup (pretty or JSON) and the Prometheus registry so
//! the daemon and the HTTP surface report through the same collectors.

pub mod error;
pub mod init;
pub mod metrics;

pub use error::{Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use metrics::{Metrics, MetricsSnapshot};
