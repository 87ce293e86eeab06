#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! Riptide daemon wiring.
//!
//! Layout: `registry` (session lifecycle and the session table), `sampler`
//! (per-session progress task and flush cadence), `config` (environment
//! loading), `bootstrap` (service wiring).

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Environment-driven configuration.
pub mod config;
/// Application error types.
pub mod error;
/// Session registry and lifecycle operations.
pub mod registry;
/// Progress sampling and flush cadence.
pub mod sampler;

pub use bootstrap::run_app;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use registry::{RegistrySettings, SessionRegistry};
pub use sampler::FlushPolicy;
