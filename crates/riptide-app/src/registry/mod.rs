//! Session registry: lifecycle operations over the engine, the store and the bus.
//!
//! The registry owns the [`table::SessionTable`]. Every operation that engages
//! a handle reserves a slot first; every operation that disengages one takes
//! the slot, cancels the session task and awaits it before writing, so each id
//! has exactly one writer at a time.

pub(crate) mod table;

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use riptide_events::{ContentId, Event, EventBus};
use riptide_runtime::RuntimeStore;
use riptide_telemetry::Metrics;
use riptide_torrent_core::magnet::{self, UNKNOWN_NAME};
use riptide_torrent_core::{
    AddOutcome, DestroyOptions, EngineAdmission, EngineHandle, RemoveOptions, SessionFilter,
    SessionIdentity, SessionInspector, SessionRecord, SessionStatus, SessionSummary, TorrentEngine,
    TorrentError, TorrentResult, TorrentSource,
};
use tracing::{debug, info, warn};

use crate::sampler::{
    DEFAULT_FLUSH_EVERY, DEFAULT_SAMPLE_INTERVAL, Emitter, FlushPolicy, SessionSampler,
};
use table::{Generation, SessionTable, SharedTable, Slot};

/// Tunables for the registry and its session tasks.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Directory used when `add` is called without a destination.
    pub download_root: PathBuf,
    /// Period between progress samples.
    pub sample_interval: Duration,
    /// Persist counters on every Nth sample.
    pub flush_every: u32,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            download_root: PathBuf::from("./downloads"),
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            flush_every: DEFAULT_FLUSH_EVERY,
        }
    }
}

/// Coordinates the engine, the session store and the event bus.
pub struct SessionRegistry<E>
where
    E: TorrentEngine + 'static,
{
    engine: Arc<E>,
    store: RuntimeStore,
    emitter: Emitter,
    settings: Arc<RegistrySettings>,
    table: SharedTable,
}

impl<E> Clone for SessionRegistry<E>
where
    E: TorrentEngine + 'static,
{
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            store: self.store.clone(),
            emitter: self.emitter.clone(),
            settings: Arc::clone(&self.settings),
            table: Arc::clone(&self.table),
        }
    }
}

impl<E> SessionRegistry<E>
where
    E: TorrentEngine + 'static,
{
    /// Construct a registry with an empty session table.
    #[must_use]
    pub fn new(
        engine: Arc<E>,
        store: RuntimeStore,
        events: EventBus,
        metrics: Option<Metrics>,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            engine,
            store,
            emitter: Emitter::new(events, metrics),
            settings: Arc::new(settings),
            table: Arc::new(Mutex::new(SessionTable::default())),
        }
    }

    /// Register a source for transfer.
    ///
    /// Link sources resolve their id immediately; blob sources are admitted in
    /// the background and announce themselves once the engine parses them.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::InvalidSource`] for links without an info hash
    /// and [`TorrentError::Storage`] when the initial record cannot be written.
    pub async fn add(
        &self,
        source: TorrentSource,
        destination: Option<PathBuf>,
    ) -> TorrentResult<AddOutcome> {
        let destination = destination.unwrap_or_else(|| self.settings.download_root.clone());
        let TorrentSource::Link { uri } = &source else {
            let registry = self.clone();
            tokio::spawn(async move {
                if let Err(err) = registry.admit_blob(source, destination).await {
                    warn!(error = %err, "blob admission failed");
                }
            });
            return Ok(AddOutcome::Pending);
        };
        let content_id = magnet::parse_info_hash(uri).ok_or(TorrentError::InvalidSource {
            reason: "missing_info_hash",
        })?;
        let name = magnet::display_name(uri).unwrap_or_else(|| UNKNOWN_NAME.to_string());
        self.add_link(content_id, name, source, destination).await
    }

    async fn add_link(
        &self,
        content_id: ContentId,
        name: String,
        source: TorrentSource,
        destination: PathBuf,
    ) -> TorrentResult<AddOutcome> {
        let reserved = self.lock_table().reserve(&content_id);
        let Some(generation) = reserved else {
            debug!(content_id = %content_id, "add coalesced onto engaged session");
            return Ok(AddOutcome::Existing(self.identity(content_id, name)));
        };

        let record = SessionRecord::admitted(
            content_id.clone(),
            name.clone(),
            source.clone(),
            destination.clone(),
        );
        if let Err(err) = self.store.upsert_session(&record).await {
            self.lock_table().release(&content_id, generation);
            return Err(TorrentError::storage("store.upsert_session", err));
        }

        info!(content_id = %content_id, name = %name, "session added");
        self.emitter.emit(Event::Added {
            content_id: content_id.clone(),
            name: name.clone(),
        });
        self.spawn_attach(content_id.clone(), generation, source, destination);
        Ok(AddOutcome::Added(SessionIdentity { content_id, name }))
    }

    async fn admit_blob(&self, source: TorrentSource, destination: PathBuf) -> TorrentResult<()> {
        let admission = self
            .engine
            .add(&source, &destination)
            .await
            .map_err(|err| TorrentError::engine("engine.add", None, err))?;
        let content_id = admission.handle.content_id().clone();

        let reserved = self.lock_table().reserve(&content_id);
        let Some(generation) = reserved else {
            debug!(content_id = %content_id, "blob resolved to an engaged session; discarding duplicate");
            discard(&admission.handle).await;
            return Ok(());
        };

        let stats = admission.handle.stats();
        let name = if stats.name.is_empty() {
            UNKNOWN_NAME.to_string()
        } else {
            stats.name
        };
        let mut record =
            SessionRecord::admitted(content_id.clone(), name.clone(), source, destination);
        record.total_size = stats.total_size;
        if stats.done {
            record.status = SessionStatus::Seeding;
        }
        if let Err(err) = self.store.upsert_session(&record).await {
            self.lock_table().release(&content_id, generation);
            discard(&admission.handle).await;
            return Err(TorrentError::storage("store.upsert_session", err));
        }

        info!(content_id = %content_id, name = %name, "session added from blob");
        self.emitter.emit(Event::Added {
            content_id: content_id.clone(),
            name,
        });
        self.go_live(&content_id, generation, admission).await;
        Ok(())
    }

    fn spawn_attach(
        &self,
        content_id: ContentId,
        generation: Generation,
        source: TorrentSource,
        destination: PathBuf,
    ) {
        let registry = self.clone();
        tokio::spawn(async move {
            registry
                .attach(content_id, generation, source, destination)
                .await;
        });
    }

    async fn attach(
        &self,
        content_id: ContentId,
        generation: Generation,
        source: TorrentSource,
        destination: PathBuf,
    ) {
        match self.engine.add(&source, &destination).await {
            Ok(admission) => {
                if admission.handle.content_id() != &content_id {
                    warn!(
                        expected = %content_id,
                        actual = %admission.handle.content_id(),
                        "engine resolved a different id for the source"
                    );
                }
                self.go_live(&content_id, generation, admission).await;
            }
            Err(err) => {
                let released = self.lock_table().release(&content_id, generation);
                if !released {
                    debug!(content_id = %content_id, error = %err, "stale admission failed");
                    return;
                }
                let message = format!("{err:#}");
                warn!(content_id = %content_id, error = %message, "engine admission failed");
                if let Err(store_err) = self.store.set_status(&content_id, SessionStatus::Error).await
                {
                    warn!(error = %store_err, content_id = %content_id, "failed to persist error status");
                }
                self.emitter.emit(Event::Error {
                    content_id,
                    message,
                });
            }
        }
    }

    async fn go_live(
        &self,
        content_id: &ContentId,
        generation: Generation,
        admission: EngineAdmission,
    ) {
        let EngineAdmission { handle, alerts } = admission;
        let sampler = SessionSampler::new(
            Arc::clone(&handle),
            self.store.clone(),
            self.emitter.clone(),
            FlushPolicy::every(self.settings.flush_every),
        );
        let period = self.settings.sample_interval;
        let table = Arc::clone(&self.table);

        let started = self
            .lock_table()
            .go_live(content_id, generation, Arc::clone(&handle), |cancel| {
                tokio::spawn(sampler.run(alerts, cancel, period, table, generation))
            });
        if started {
            debug!(content_id = %content_id, "session live");
            self.refresh_live_gauge();
        } else {
            debug!(content_id = %content_id, "session detached while attaching; destroying late handle");
            discard(&handle).await;
        }
    }

    /// Disengage the live handle, keeping its data and recording the latest counters.
    ///
    /// No-op when the id has no live or attaching handle.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::Storage`] when the final flush fails.
    pub async fn pause(&self, content_id: &ContentId) -> TorrentResult<()> {
        let taken = self.lock_table().take(content_id);
        let Some(slot) = taken else {
            debug!(content_id = %content_id, "pause ignored; session not engaged");
            return Ok(());
        };
        let handle = slot.quiesce().await;
        self.refresh_live_gauge();

        let result = if let Some(handle) = handle {
            let stats = handle.stats();
            if let Err(err) = handle.destroy(DestroyOptions::default()).await {
                warn!(error = %err, content_id = %content_id, "failed to tear down paused handle");
            }
            self.store
                .flush(content_id, stats.downloaded, stats.uploaded, SessionStatus::Paused)
                .await
        } else {
            self.store.set_status(content_id, SessionStatus::Paused).await
        };
        result.map_err(|err| TorrentError::storage("store.flush", err))?;
        info!(content_id = %content_id, "session paused");
        Ok(())
    }

    /// Re-engage a stored session from its recorded source.
    ///
    /// Coalesces onto an existing live or attaching handle.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::NotFound`] without a record and
    /// [`TorrentError::NoSource`] when the record cannot be reattached.
    pub async fn resume(&self, content_id: &ContentId) -> TorrentResult<()> {
        let record = self
            .store
            .get(content_id)
            .await
            .map_err(|err| TorrentError::storage("store.get", err))?
            .ok_or_else(|| TorrentError::NotFound {
                content_id: content_id.clone(),
            })?;
        let source = record.source.ok_or_else(|| TorrentError::NoSource {
            content_id: content_id.clone(),
        })?;

        let reserved = self.lock_table().reserve(content_id);
        let Some(generation) = reserved else {
            debug!(content_id = %content_id, "resume coalesced onto engaged session");
            return Ok(());
        };
        if let Err(err) = self
            .store
            .set_status(content_id, SessionStatus::Downloading)
            .await
        {
            self.lock_table().release(content_id, generation);
            return Err(TorrentError::storage("store.set_status", err));
        }
        info!(content_id = %content_id, "session resumed");
        self.spawn_attach(content_id.clone(), generation, source, record.destination);
        Ok(())
    }

    /// Tear a session down and forget it, optionally deleting its payload.
    ///
    /// Payload cleanup runs only after the engine finished tearing the handle
    /// down; cleanup failures are logged and swallowed.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::NotFound`] when the id has neither a record nor
    /// a handle, and [`TorrentError::Storage`] when the record cannot be deleted.
    pub async fn remove(&self, content_id: &ContentId, options: RemoveOptions) -> TorrentResult<()> {
        // Read before taking the slot: an early return must leave the live session engaged.
        let record = self
            .store
            .get(content_id)
            .await
            .map_err(|err| TorrentError::storage("store.get", err))?;
        let taken: Option<Slot> = self.lock_table().take(content_id);
        if taken.is_none() && record.is_none() {
            return Err(TorrentError::NotFound {
                content_id: content_id.clone(),
            });
        }

        let mut live_name = None;
        if let Some(slot) = taken {
            if let Some(handle) = slot.quiesce().await {
                live_name = Some(handle.stats().name).filter(|name| !name.is_empty());
                let options = DestroyOptions {
                    delete_store: options.delete_files,
                };
                if let Err(err) = handle.destroy(options).await {
                    warn!(error = %err, content_id = %content_id, "failed to tear down removed handle");
                }
            }
            self.refresh_live_gauge();
        }

        if options.delete_files {
            let destination = record
                .as_ref()
                .map_or_else(|| self.settings.download_root.clone(), |r| r.destination.clone());
            let resolved_name = live_name.or_else(|| {
                record
                    .as_ref()
                    .filter(|r| r.total_size > 0)
                    .map(|r| r.name.clone())
            });
            match resolved_name {
                Some(name) => remove_payload(content_id, &destination, &name).await,
                None => debug!(content_id = %content_id, "payload name unresolved; nothing to delete"),
            }
        }

        self.store
            .delete(content_id)
            .await
            .map_err(|err| TorrentError::storage("store.delete", err))?;
        info!(content_id = %content_id, delete_files = options.delete_files, "session removed");
        self.emitter.emit(Event::Removed {
            content_id: content_id.clone(),
        });
        Ok(())
    }

    /// Reattach every session that was active when the process last stopped.
    ///
    /// Returns how many sessions were resubmitted.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::Storage`] when the store cannot be read.
    pub async fn restore(&self) -> TorrentResult<usize> {
        let records = self
            .store
            .list_restorable()
            .await
            .map_err(|err| TorrentError::storage("store.list_restorable", err))?;
        let mut restored = 0;
        for record in records {
            let Some(source) = record.source else {
                warn!(content_id = %record.content_id, "skipping restore of session without source");
                continue;
            };
            let reserved = self.lock_table().reserve(&record.content_id);
            let Some(generation) = reserved else {
                continue;
            };
            self.spawn_attach(record.content_id, generation, source, record.destination);
            restored += 1;
        }
        info!(restored, "restored sessions from store");
        Ok(restored)
    }

    /// Flush every live session and tear the handles down.
    pub async fn shutdown(&self) {
        let slots = self.lock_table().drain();
        for (content_id, slot) in slots {
            let Some(handle) = slot.quiesce().await else {
                continue;
            };
            let stats = handle.stats();
            let status = if stats.done {
                SessionStatus::Seeding
            } else {
                SessionStatus::Downloading
            };
            if let Err(err) = self
                .store
                .flush(&content_id, stats.downloaded, stats.uploaded, status)
                .await
            {
                warn!(error = %err, content_id = %content_id, "failed to flush session on shutdown");
            }
            if let Err(err) = handle.destroy(DestroyOptions::default()).await {
                warn!(error = %err, content_id = %content_id, "failed to tear down handle on shutdown");
            }
        }
        if let Err(err) = self.engine.shutdown().await {
            warn!(error = %err, "engine shutdown failed");
        }
        self.refresh_live_gauge();
        info!("session registry shut down");
    }

    /// Summary for one session, merged with live metrics and the payload's
    /// file list when engaged.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::Storage`] when the store cannot be read.
    pub async fn status(&self, content_id: &ContentId) -> TorrentResult<Option<SessionSummary>> {
        let record = self
            .store
            .get(content_id)
            .await
            .map_err(|err| TorrentError::storage("store.get", err))?;
        let Some(record) = record else {
            return Ok(None);
        };
        let live = self.lock_table().live_handle(content_id);
        let mut summary =
            SessionSummary::from_record(&record, live.as_ref().map(|handle| handle.stats()).as_ref());
        if let Some(handle) = live {
            summary.files = handle.files();
        }
        Ok(Some(summary))
    }

    /// Summaries for every session matching the filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::Storage`] when the store cannot be read.
    pub async fn list(&self, filter: SessionFilter) -> TorrentResult<Vec<SessionSummary>> {
        let records = self
            .store
            .list(&filter)
            .await
            .map_err(|err| TorrentError::storage("store.list", err))?;
        Ok(records.iter().map(|record| self.summarise(record)).collect())
    }

    /// Assign or clear the session's category.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::NotFound`] for unknown ids.
    pub async fn set_category(
        &self,
        content_id: &ContentId,
        category_id: Option<i64>,
    ) -> TorrentResult<()> {
        let updated = self
            .store
            .set_category(content_id, category_id)
            .await
            .map_err(|err| TorrentError::storage("store.set_category", err))?;
        if !updated {
            return Err(TorrentError::NotFound {
                content_id: content_id.clone(),
            });
        }
        Ok(())
    }

    /// Link or unlink an external media-metadata entry.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::NotFound`] for unknown ids.
    pub async fn link_metadata(
        &self,
        content_id: &ContentId,
        external_id: Option<i64>,
    ) -> TorrentResult<()> {
        let updated = self
            .store
            .set_external_id(content_id, external_id)
            .await
            .map_err(|err| TorrentError::storage("store.set_external_id", err))?;
        if !updated {
            return Err(TorrentError::NotFound {
                content_id: content_id.clone(),
            });
        }
        Ok(())
    }

    /// Whether the id currently has an attaching or live handle.
    #[must_use]
    pub fn is_engaged(&self, content_id: &ContentId) -> bool {
        self.lock_table().contains(content_id)
    }

    /// Number of live handles.
    #[must_use]
    pub fn live_sessions(&self) -> usize {
        self.lock_table().live_count()
    }

    fn summarise(&self, record: &SessionRecord) -> SessionSummary {
        let live = self.lock_table().live_handle(&record.content_id);
        let stats = live.map(|handle| handle.stats());
        SessionSummary::from_record(record, stats.as_ref())
    }

    fn identity(&self, content_id: ContentId, fallback: String) -> SessionIdentity {
        let live = self.lock_table().live_handle(&content_id);
        let name = live
            .map(|handle| handle.stats().name)
            .filter(|name| !name.is_empty())
            .unwrap_or(fallback);
        SessionIdentity { content_id, name }
    }

    fn refresh_live_gauge(&self) {
        if let Some(metrics) = self.emitter.metrics() {
            metrics.set_live_sessions(self.live_sessions());
        }
    }

    fn lock_table(&self) -> std::sync::MutexGuard<'_, SessionTable> {
        table::lock(&self.table)
    }
}

#[async_trait]
impl<E> SessionInspector for SessionRegistry<E>
where
    E: TorrentEngine + 'static,
{
    async fn list(&self, filter: SessionFilter) -> TorrentResult<Vec<SessionSummary>> {
        Self::list(self, filter).await
    }

    async fn get(&self, content_id: &ContentId) -> TorrentResult<Option<SessionSummary>> {
        self.status(content_id).await
    }
}

async fn discard(handle: &Arc<dyn EngineHandle>) {
    if let Err(err) = handle.destroy(DestroyOptions::default()).await {
        warn!(error = %err, content_id = %handle.content_id(), "failed to destroy discarded handle");
    }
}

/// Delete `<destination>/<name>`; the name must be a single plain component.
async fn remove_payload(content_id: &ContentId, destination: &Path, name: &str) {
    let mut components = Path::new(name).components();
    let single_component = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single_component {
        warn!(content_id = %content_id, name = %name, "refusing to delete payload with unsafe name");
        return;
    }

    let target = destination.join(name);
    let result = match tokio::fs::symlink_metadata(&target).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&target).await,
        Ok(_) => tokio::fs::remove_file(&target).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => debug!(content_id = %content_id, path = %target.display(), "payload deleted"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(content_id = %content_id, path = %target.display(), "payload already absent");
        }
        Err(err) => warn!(
            error = %err,
            content_id = %content_id,
            path = %target.display(),
            "failed to delete payload"
        ),
    }
}
