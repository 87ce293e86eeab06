//! Scriptable in-memory engine used by tests and the development daemon.
//!
//! Blob sources are interpreted as UTF-8 text holding either a magnet link or
//! a bare hex info hash; anything else is rejected as unparseable metainfo.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use riptide_events::{ContentId, DiscoveredFile};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::magnet;
use crate::model::TorrentSource;
use crate::service::{
    DestroyOptions, EngineAdmission, EngineAlert, EngineHandle, HandleStats, TorrentEngine,
};

/// Metadata a stub handle resolves to immediately after admission.
#[derive(Debug, Clone)]
pub struct StubMetadata {
    /// Name advertised by the metadata; defaults to the link's `dn` or the id.
    pub name: Option<String>,
    /// Files contained in the payload.
    pub files: Vec<DiscoveredFile>,
}

/// In-memory test double for [`TorrentEngine`].
#[derive(Default)]
pub struct StubEngine {
    handles: Mutex<Vec<Arc<StubHandle>>>,
    admissions: AtomicUsize,
    fail_next: Mutex<Option<String>>,
    admission_delay: Option<Duration>,
    metadata: Option<StubMetadata>,
    bytes_per_second: Option<u64>,
    complete_on_admission: bool,
}

impl StubEngine {
    /// Engine whose handles stay idle until scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every admission, leaving sessions in the attaching state meanwhile.
    #[must_use]
    pub const fn with_admission_delay(mut self, delay: Duration) -> Self {
        self.admission_delay = Some(delay);
        self
    }

    /// Resolve metadata for every new handle right after admission.
    #[must_use]
    pub fn with_metadata(mut self, metadata: StubMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Download at a fixed rate measured from admission.
    ///
    /// Counters follow the clock, so reading stats never moves a transfer forward.
    #[must_use]
    pub const fn with_simulated_transfer(mut self, bytes_per_second: u64) -> Self {
        self.bytes_per_second = Some(bytes_per_second);
        self
    }

    /// Admit every handle with its payload already complete, as when the data
    /// is found on disk.
    #[must_use]
    pub const fn with_existing_payloads(mut self) -> Self {
        self.complete_on_admission = true;
        self
    }

    /// Make the next admission fail with the provided message.
    pub fn fail_next_add(&self, message: impl Into<String>) {
        *lock(&self.fail_next) = Some(message.into());
    }

    /// Total admissions accepted so far.
    #[must_use]
    pub fn admissions(&self) -> usize {
        self.admissions.load(Ordering::SeqCst)
    }

    /// Most recently created handle for the id.
    #[must_use]
    pub fn handle(&self, content_id: &ContentId) -> Option<Arc<StubHandle>> {
        lock(&self.handles)
            .iter()
            .rev()
            .find(|handle| &handle.content_id == content_id)
            .cloned()
    }

    /// Handles for the id that have not been destroyed.
    #[must_use]
    pub fn live_handles(&self, content_id: &ContentId) -> usize {
        lock(&self.handles)
            .iter()
            .filter(|handle| &handle.content_id == content_id && !handle.is_destroyed())
            .count()
    }

    fn resolve_id(source: &TorrentSource) -> Result<ContentId> {
        match source {
            TorrentSource::Link { uri } => magnet::parse_info_hash(uri)
                .ok_or_else(|| anyhow!("link does not carry an info hash")),
            TorrentSource::Blob { bytes } => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|_| anyhow!("unparseable metainfo payload"))?
                    .trim();
                magnet::parse_info_hash(text)
                    .or_else(|| ContentId::parse_hex(text).ok())
                    .ok_or_else(|| anyhow!("unparseable metainfo payload"))
            }
        }
    }
}

#[async_trait]
impl TorrentEngine for StubEngine {
    async fn add(&self, source: &TorrentSource, destination: &Path) -> Result<EngineAdmission> {
        if let Some(delay) = self.admission_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = lock(&self.fail_next).take() {
            bail!(message);
        }

        let content_id = Self::resolve_id(source)?;
        let (alerts_tx, alerts_rx) = mpsc::unbounded_channel();
        let handle = Arc::new(StubHandle {
            content_id,
            destination: destination.to_path_buf(),
            stats: Mutex::new(HandleStats::default()),
            files: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
            destroy_calls: Mutex::new(Vec::new()),
            alerts: alerts_tx,
            bytes_per_second: self.bytes_per_second,
            admitted_at: Instant::now(),
        });
        if let Some(metadata) = &self.metadata {
            let name = metadata
                .name
                .clone()
                .or_else(|| match source {
                    TorrentSource::Link { uri } => magnet::display_name(uri),
                    TorrentSource::Blob { .. } => None,
                })
                .unwrap_or_else(|| handle.content_id.to_string());
            handle.resolve_metadata(name, metadata.files.clone());
        }
        if self.complete_on_admission {
            handle.complete_silently();
        }

        lock(&self.handles).push(Arc::clone(&handle));
        self.admissions.fetch_add(1, Ordering::SeqCst);
        Ok(EngineAdmission {
            handle,
            alerts: alerts_rx,
        })
    }
}

/// Handle produced by [`StubEngine`]; tests drive it directly.
pub struct StubHandle {
    content_id: ContentId,
    destination: PathBuf,
    stats: Mutex<HandleStats>,
    files: Mutex<Vec<DiscoveredFile>>,
    destroyed: AtomicBool,
    destroy_calls: Mutex<Vec<DestroyOptions>>,
    alerts: mpsc::UnboundedSender<EngineAlert>,
    bytes_per_second: Option<u64>,
    admitted_at: Instant,
}

impl StubHandle {
    /// Destination the handle was admitted with.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Overwrite the transfer counters.
    pub fn set_progress(&self, downloaded: u64, uploaded: u64) {
        let mut stats = lock(&self.stats);
        stats.downloaded = downloaded;
        stats.uploaded = uploaded;
        stats.fraction_complete = fraction(downloaded, stats.total_size);
    }

    /// Overwrite the rate and peer readings.
    pub fn set_rates(&self, download_rate: u64, upload_rate: u64, peer_count: u32) {
        let mut stats = lock(&self.stats);
        stats.download_rate = download_rate;
        stats.upload_rate = upload_rate;
        stats.peer_count = peer_count;
    }

    /// Resolve metadata and raise the matching alert.
    pub fn resolve_metadata(&self, name: impl Into<String>, files: Vec<DiscoveredFile>) {
        let name = name.into();
        let total_size = files.iter().map(|file| file.length).sum();
        {
            let mut stats = lock(&self.stats);
            stats.name.clone_from(&name);
            stats.total_size = total_size;
            stats.fraction_complete = fraction(stats.downloaded, total_size);
        }
        lock(&self.files).clone_from(&files);
        let _ = self.alerts.send(EngineAlert::MetadataResolved {
            name,
            total_size,
            files,
        });
    }

    /// Mark the payload complete without raising an alert.
    pub fn complete_silently(&self) {
        let mut stats = lock(&self.stats);
        stats.downloaded = stats.total_size.max(stats.downloaded);
        stats.fraction_complete = 1.0;
        stats.download_rate = 0;
        stats.eta_seconds = Some(0);
        stats.done = true;
    }

    /// Mark the payload complete and raise the done alert.
    pub fn complete(&self) {
        self.complete_silently();
        let _ = self.alerts.send(EngineAlert::Done);
    }

    /// Raise a verification alert.
    pub fn verify(&self, active: bool) {
        let alert = if active {
            EngineAlert::Verifying
        } else {
            EngineAlert::Verified
        };
        let _ = self.alerts.send(alert);
    }

    /// Raise a failure alert.
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.alerts.send(EngineAlert::Failed {
            message: message.into(),
        });
    }

    /// Flip the destroyed flag as if the engine dropped the handle on its own.
    pub fn drop_externally(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    /// Options passed to every `destroy` call so far.
    #[must_use]
    pub fn destroy_calls(&self) -> Vec<DestroyOptions> {
        lock(&self.destroy_calls).clone()
    }
}

#[async_trait]
impl EngineHandle for StubHandle {
    fn content_id(&self) -> &ContentId {
        &self.content_id
    }

    fn stats(&self) -> HandleStats {
        let mut stats = lock(&self.stats);
        if let Some(rate) = self.bytes_per_second
            && !stats.done
            && stats.total_size > 0
        {
            let elapsed_ms =
                u64::try_from(self.admitted_at.elapsed().as_millis()).unwrap_or(u64::MAX);
            let target = rate.saturating_mul(elapsed_ms) / 1_000;
            stats.downloaded = stats.downloaded.max(target).min(stats.total_size);
            stats.download_rate = rate;
            stats.fraction_complete = fraction(stats.downloaded, stats.total_size);
            stats.eta_seconds = Some((stats.total_size - stats.downloaded).div_ceil(rate.max(1)));
            if stats.downloaded == stats.total_size {
                stats.done = true;
                stats.download_rate = 0;
            }
        }
        stats.clone()
    }

    fn files(&self) -> Vec<DiscoveredFile> {
        lock(&self.files).clone()
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    async fn destroy(&self, options: DestroyOptions) -> Result<()> {
        lock(&self.destroy_calls).push(options);
        self.destroyed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[allow(clippy::cast_precision_loss)]
fn fraction(downloaded: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (downloaded as f64 / total as f64).clamp(0.0, 1.0)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
