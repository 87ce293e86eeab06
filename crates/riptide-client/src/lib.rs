#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! Client side of the Riptide push channel.
//!
//! [`PushClient`] keeps a WebSocket subscription alive with doubling backoff
//! and routes decoded events to per-kind listeners. [`CacheReconciler`] turns
//! that stream into a local session list: seeded by a bulk fetch, patched by
//! deltas, and refetched whenever the channel reopens.

pub mod backoff;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod reconciler;
pub mod transport;

pub use backoff::Backoff;
pub use cache::{CacheAction, SessionCache};
pub use client::{ConnectionState, Listener, PushClient, Subscription};
pub use config::{DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, PushClientConfig};
pub use error::{ClientError, ClientResult};
pub use fetcher::{HttpSessionFetcher, SessionFetcher};
pub use reconciler::CacheReconciler;
pub use transport::{Connection, Transport, WsTransport};
