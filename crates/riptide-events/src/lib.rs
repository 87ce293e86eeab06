#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! Event vocabulary and in-process bus for the Riptide platform.
//!
//! Every event carries the [`ContentId`] of the session it refers to and
//! serialises to the push-channel frame `{"type": kind, "data": payload}`.
//! The bus is a thin wrapper over `tokio::broadcast`: publishing never blocks
//! and there is no replay for late subscribers.

pub mod content_id;
pub mod error;
pub mod payloads;
pub mod routing;

pub use content_id::{CONTENT_ID_BASE32_LEN, CONTENT_ID_HEX_LEN, ContentId};
pub use error::ContentIdError;
pub use payloads::{DEFAULT_BUS_CAPACITY, DiscoveredFile, Event, EventKind, ProgressSnapshot};
pub use routing::{EventBus, EventStream};
