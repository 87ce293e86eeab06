//! Engine and inspection traits implemented by adapters and the registry.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use riptide_events::{ContentId, DiscoveredFile};
use tokio::sync::mpsc;

use crate::error::TorrentResult;
use crate::model::{SessionFilter, SessionSummary, TorrentSource};

/// Counters read from a live handle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandleStats {
    /// Name reported by the engine; empty until metadata resolves.
    pub name: String,
    /// Total payload size; zero until metadata resolves.
    pub total_size: u64,
    /// Bytes downloaded.
    pub downloaded: u64,
    /// Bytes uploaded.
    pub uploaded: u64,
    /// Download rate in bytes per second.
    pub download_rate: u64,
    /// Upload rate in bytes per second.
    pub upload_rate: u64,
    /// Completion ratio.
    pub fraction_complete: f64,
    /// Connected peers.
    pub peer_count: u32,
    /// Estimated seconds remaining.
    pub eta_seconds: Option<u64>,
    /// Whether the payload is fully downloaded.
    pub done: bool,
}

/// Asynchronous notifications raised by a live handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAlert {
    /// Metadata became available.
    MetadataResolved {
        /// Name advertised by the metadata.
        name: String,
        /// Total payload size in bytes.
        total_size: u64,
        /// Files contained in the payload.
        files: Vec<DiscoveredFile>,
    },
    /// The engine started verifying existing data.
    Verifying,
    /// Verification finished and transfer resumed.
    Verified,
    /// The payload finished downloading.
    Done,
    /// The engine gave up on the session.
    Failed {
        /// Failure description.
        message: String,
    },
}

/// Flags accompanying a handle teardown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestroyOptions {
    /// Delete the engine's piece store along with the handle.
    pub delete_store: bool,
}

/// A handle accepted by the engine together with its alert stream.
pub struct EngineAdmission {
    /// The live handle.
    pub handle: Arc<dyn EngineHandle>,
    /// Alerts raised for this handle; closes when the handle goes away.
    pub alerts: mpsc::UnboundedReceiver<EngineAlert>,
}

/// Engine object bound to a content id while it is actively engaged.
#[async_trait]
pub trait EngineHandle: Send + Sync {
    /// Identifier the engine derived from the source.
    fn content_id(&self) -> &ContentId;

    /// Current counters.
    fn stats(&self) -> HandleStats;

    /// Files known for the payload; empty until metadata resolves.
    fn files(&self) -> Vec<DiscoveredFile>;

    /// Whether the handle has been torn down.
    fn is_destroyed(&self) -> bool;

    /// Tear the handle down, resolving once teardown completes.
    async fn destroy(&self, options: DestroyOptions) -> anyhow::Result<()>;
}

/// Primary engine trait implemented by adapters.
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    /// Admit a source, writing its payload under `destination`.
    async fn add(
        &self,
        source: &TorrentSource,
        destination: &Path,
    ) -> anyhow::Result<EngineAdmission>;

    /// Release engine-wide resources; default implementation does nothing.
    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Read-only view over sessions, consumed by the HTTP surface.
#[async_trait]
pub trait SessionInspector: Send + Sync {
    /// List sessions matching the filter, most recently added first.
    async fn list(&self, filter: SessionFilter) -> TorrentResult<Vec<SessionSummary>>;

    /// Fetch a single session.
    async fn get(&self, content_id: &ContentId) -> TorrentResult<Option<SessionSummary>>;
}
