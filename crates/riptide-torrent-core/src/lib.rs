#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! Engine-agnostic session interfaces and DTOs.
//!
//! Layout: `model` (records, statuses, summaries), `service` (engine and
//! inspection traits), `magnet` (link inspection), `error`, and `stub` (an
//! in-memory engine behind the `stub` feature).

pub mod error;
pub mod magnet;
pub mod model;
pub mod service;
#[cfg(any(feature = "stub", test))]
pub mod stub;

pub use error::{TorrentError, TorrentResult};
pub use model::{
    AddOutcome, RemoveOptions, SessionFilter, SessionIdentity, SessionRecord, SessionStatus,
    SessionSummary, TorrentSource,
};
pub use service::{
    DestroyOptions, EngineAdmission, EngineAlert, EngineHandle, HandleStats, SessionInspector,
    TorrentEngine,
};
