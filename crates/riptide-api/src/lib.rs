#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! HTTP surface of the Riptide daemon.
//!
//! Hosts the authenticated WebSocket push channel at `/v1/events/ws`, the
//! read-only session routes the client uses for its bulk fetch, and the
//! Prometheus scrape endpoint. Every bus event is encoded once as
//! `{"type": kind, "data": payload}` and offered to each open connection
//! without waiting on slow readers.

pub mod auth;
pub mod error;
pub mod http;
pub mod push;
pub mod state;

pub use auth::{CredentialVerifier, StaticTokenVerifier};
pub use error::{ApiServerError, ApiServerResult};
pub use http::router::ApiServer;
pub use push::{ConnectionId, PushHub};
pub use state::ApiState;
