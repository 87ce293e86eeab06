use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use riptide_app::{RegistrySettings, SessionRegistry};
use riptide_events::{ContentId, DiscoveredFile, Event, EventBus, EventStream};
use riptide_runtime::RuntimeStore;
use sqlx::sqlite::SqlitePoolOptions;
use riptide_telemetry::Metrics;
use riptide_torrent_core::stub::{StubEngine, StubMetadata};
use riptide_torrent_core::{
    AddOutcome, DestroyOptions, EngineHandle, RemoveOptions, SessionFilter, SessionRecord,
    SessionStatus, TorrentError, TorrentSource,
};
use tempfile::TempDir;
use tokio::time::{sleep, timeout};
use tokio_stream::StreamExt;

const HASH: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

fn link() -> String {
    format!("magnet:?xt=urn:btih:{HASH}&dn=Foo")
}

fn content_id() -> ContentId {
    ContentId::parse_hex(HASH).expect("valid id")
}

fn foo_metadata() -> StubMetadata {
    StubMetadata {
        name: Some("Foo".into()),
        files: vec![DiscoveredFile {
            name: "foo.bin".into(),
            length: 1_000,
        }],
    }
}

struct Harness {
    registry: SessionRegistry<StubEngine>,
    engine: Arc<StubEngine>,
    store: RuntimeStore,
    events: EventBus,
    metrics: Metrics,
    downloads: TempDir,
}

async fn harness(engine: StubEngine) -> Result<Harness> {
    harness_with_store(engine, RuntimeStore::in_memory().await?).await
}

async fn harness_with_store(engine: StubEngine, store: RuntimeStore) -> Result<Harness> {
    let downloads = TempDir::new()?;
    let engine = Arc::new(engine);
    let events = EventBus::with_capacity(1024);
    let metrics = Metrics::new()?;
    let registry = SessionRegistry::new(
        Arc::clone(&engine),
        store.clone(),
        events.clone(),
        Some(metrics.clone()),
        RegistrySettings {
            download_root: downloads.path().to_path_buf(),
            sample_interval: Duration::from_millis(20),
            flush_every: 5,
        },
    );
    Ok(Harness {
        registry,
        engine,
        store,
        events,
        metrics,
        downloads,
    })
}

async fn wait_for<F>(what: &str, mut check: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    timeout(Duration::from_secs(5), async {
        while !check() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map_err(|_| anyhow!("timed out waiting for {what}"))
}

async fn wait_for_event<F>(stream: &mut EventStream, mut matches: F) -> Result<Event>
where
    F: FnMut(&Event) -> bool,
{
    timeout(Duration::from_secs(5), async {
        while let Some(item) = stream.next().await {
            let event = item?;
            if matches(&event) {
                return Ok(event);
            }
        }
        bail!("event stream closed")
    })
    .await?
}

async fn drain(stream: &mut EventStream, window: Duration) -> Vec<Event> {
    let mut seen = Vec::new();
    while let Ok(Some(Ok(event))) = timeout(window, stream.next()).await {
        seen.push(event);
    }
    seen
}

async fn record(store: &RuntimeStore, id: &ContentId) -> Result<SessionRecord> {
    store
        .get(id)
        .await?
        .ok_or_else(|| anyhow!("record missing for {id}"))
}

#[tokio::test]
async fn add_link_registers_before_metadata() -> Result<()> {
    let h = harness(StubEngine::new()).await?;
    let mut stream = h.events.subscribe();

    let outcome = h.registry.add(TorrentSource::link(link()), None).await?;
    let AddOutcome::Added(identity) = outcome else {
        bail!("expected a new session, got {outcome:?}");
    };
    assert_eq!(identity.content_id, content_id());
    assert_eq!(identity.name, "Foo");

    let stored = record(&h.store, &content_id()).await?;
    assert_eq!(stored.status, SessionStatus::Downloading);
    assert_eq!(stored.total_size, 0);
    assert_eq!(stored.destination, h.downloads.path());

    let added = wait_for_event(&mut stream, |event| matches!(event, Event::Added { .. })).await?;
    assert_eq!(
        added,
        Event::Added {
            content_id: content_id(),
            name: "Foo".into()
        }
    );

    let registry = h.registry.clone();
    wait_for("live handle", || registry.live_sessions() == 1).await?;
    assert_eq!(h.engine.admissions(), 1);
    assert_eq!(h.metrics.snapshot().live_sessions, 1);
    Ok(())
}

#[tokio::test]
async fn links_without_a_hash_are_rejected() -> Result<()> {
    let h = harness(StubEngine::new()).await?;
    let err = h
        .registry
        .add(TorrentSource::link("magnet:?dn=NoHash"), None)
        .await
        .expect_err("link without hash");
    assert!(matches!(err, TorrentError::InvalidSource { .. }));
    assert!(h.store.list(&SessionFilter::default()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn sampler_streams_progress_and_throttles_writes() -> Result<()> {
    let h = harness(StubEngine::new()).await?;
    let mut stream = h.events.subscribe();
    h.registry.add(TorrentSource::link(link()), None).await?;
    let registry = h.registry.clone();
    wait_for("live handle", || registry.live_sessions() == 1).await?;

    let stub = h.engine.handle(&content_id()).expect("stub handle");
    stub.set_progress(250, 10);
    let progress = wait_for_event(&mut stream, |event| {
        matches!(event, Event::Progress(snapshot) if snapshot.downloaded == 250)
    })
    .await?;
    assert_eq!(progress.content_id(), &content_id());

    timeout(Duration::from_secs(5), async {
        loop {
            let stored = record(&h.store, &content_id()).await?;
            if stored.downloaded == 250 {
                return Ok::<_, anyhow::Error>(stored);
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await??;
    assert!(h.metrics.snapshot().counter_flushes_total >= 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_adds_coalesce_onto_one_handle() -> Result<()> {
    let h = harness(StubEngine::new().with_admission_delay(Duration::from_millis(100))).await?;
    let (first, second) = tokio::join!(
        h.registry.add(TorrentSource::link(link()), None),
        h.registry.add(TorrentSource::link(link()), None),
    );
    let outcomes = [first?, second?];
    let added = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, AddOutcome::Added(_)))
        .count();
    let existing = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, AddOutcome::Existing(_)))
        .count();
    assert_eq!((added, existing), (1, 1));

    h.registry.resume(&content_id()).await?;

    let registry = h.registry.clone();
    wait_for("live handle", || registry.live_sessions() == 1).await?;
    sleep(Duration::from_millis(150)).await;
    assert_eq!(h.engine.admissions(), 1);
    assert_eq!(h.engine.live_handles(&content_id()), 1);
    Ok(())
}

#[tokio::test]
async fn pause_and_resume_preserve_counters() -> Result<()> {
    let h = harness(StubEngine::new()).await?;
    h.registry.add(TorrentSource::link(link()), None).await?;
    let registry = h.registry.clone();
    wait_for("live handle", || registry.live_sessions() == 1).await?;

    let first = h.engine.handle(&content_id()).expect("stub handle");
    first.set_progress(300, 40);
    h.registry.pause(&content_id()).await?;

    let paused = record(&h.store, &content_id()).await?;
    assert_eq!(paused.status, SessionStatus::Paused);
    assert_eq!((paused.downloaded, paused.uploaded), (300, 40));
    assert!(first.is_destroyed());
    assert_eq!(first.destroy_calls(), vec![DestroyOptions::default()]);
    assert!(!h.registry.is_engaged(&content_id()));

    h.registry.pause(&content_id()).await?;

    h.registry.resume(&content_id()).await?;
    let registry = h.registry.clone();
    wait_for("reattached handle", || registry.live_sessions() == 1).await?;
    assert_eq!(h.engine.admissions(), 2);
    let resumed = record(&h.store, &content_id()).await?;
    assert_eq!(resumed.status, SessionStatus::Downloading);
    assert_eq!((resumed.downloaded, resumed.uploaded), (300, 40));

    h.registry.pause(&content_id()).await?;
    let paused_again = record(&h.store, &content_id()).await?;
    assert_eq!((paused_again.downloaded, paused_again.uploaded), (300, 40));
    Ok(())
}

#[tokio::test]
async fn late_admission_after_pause_is_destroyed() -> Result<()> {
    let h = harness(StubEngine::new().with_admission_delay(Duration::from_millis(100))).await?;
    h.registry.add(TorrentSource::link(link()), None).await?;
    assert!(h.registry.is_engaged(&content_id()));
    h.registry.pause(&content_id()).await?;

    let engine = Arc::clone(&h.engine);
    wait_for("late admission", || engine.admissions() == 1).await?;
    let engine = Arc::clone(&h.engine);
    wait_for("late handle teardown", || {
        engine.live_handles(&content_id()) == 0
    })
    .await?;
    assert_eq!(h.registry.live_sessions(), 0);
    assert_eq!(
        record(&h.store, &content_id()).await?.status,
        SessionStatus::Paused
    );
    Ok(())
}

#[tokio::test]
async fn resume_reports_missing_records_and_sources() -> Result<()> {
    let h = harness(StubEngine::new()).await?;
    let err = h
        .registry
        .resume(&content_id())
        .await
        .expect_err("unknown id");
    assert!(matches!(err, TorrentError::NotFound { .. }));

    let mut sourceless = SessionRecord::admitted(
        content_id(),
        "Foo",
        TorrentSource::link(link()),
        h.downloads.path().to_path_buf(),
    );
    sourceless.source = None;
    sourceless.status = SessionStatus::Paused;
    h.store.upsert_session(&sourceless).await?;
    let err = h
        .registry
        .resume(&content_id())
        .await
        .expect_err("sourceless record");
    assert!(matches!(err, TorrentError::NoSource { .. }));
    Ok(())
}

#[tokio::test]
async fn remove_with_delete_tears_down_before_cleanup() -> Result<()> {
    let h = harness(StubEngine::new().with_metadata(foo_metadata())).await?;
    let payload = h.downloads.path().join("Foo");
    std::fs::create_dir_all(&payload)?;
    std::fs::write(payload.join("foo.bin"), b"payload")?;

    h.registry.add(TorrentSource::link(link()), None).await?;
    let registry = h.registry.clone();
    wait_for("live handle", || registry.live_sessions() == 1).await?;
    let stub = h.engine.handle(&content_id()).expect("stub handle");

    let mut stream = h.events.subscribe();
    h.registry
        .remove(&content_id(), RemoveOptions { delete_files: true })
        .await?;

    assert_eq!(
        stub.destroy_calls(),
        vec![DestroyOptions { delete_store: true }]
    );
    assert!(!payload.exists());
    assert!(h.store.get(&content_id()).await?.is_none());

    let removed = drain(&mut stream, Duration::from_millis(100))
        .await
        .into_iter()
        .filter(|event| matches!(event, Event::Removed { .. }))
        .count();
    assert_eq!(removed, 1);

    let err = h
        .registry
        .remove(&content_id(), RemoveOptions::default())
        .await
        .expect_err("already removed");
    assert!(matches!(err, TorrentError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn remove_succeeds_when_cleanup_has_nothing_to_delete() -> Result<()> {
    let h = harness(StubEngine::new().with_metadata(foo_metadata())).await?;
    h.registry.add(TorrentSource::link(link()), None).await?;
    let registry = h.registry.clone();
    wait_for("live handle", || registry.live_sessions() == 1).await?;

    let mut stream = h.events.subscribe();
    h.registry
        .remove(&content_id(), RemoveOptions { delete_files: true })
        .await?;
    let removed = drain(&mut stream, Duration::from_millis(100))
        .await
        .into_iter()
        .filter(|event| matches!(event, Event::Removed { .. }))
        .count();
    assert_eq!(removed, 1);
    assert!(h.store.get(&content_id()).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn completion_is_announced_exactly_once() -> Result<()> {
    let h = harness(StubEngine::new().with_metadata(foo_metadata())).await?;
    let mut stream = h.events.subscribe();
    h.registry.add(TorrentSource::link(link()), None).await?;
    let registry = h.registry.clone();
    wait_for("live handle", || registry.live_sessions() == 1).await?;

    let metadata = wait_for_event(&mut stream, |event| {
        matches!(event, Event::MetadataResolved { .. })
    })
    .await?;
    assert!(matches!(
        metadata,
        Event::MetadataResolved {
            total_size: 1_000,
            ..
        }
    ));

    let stub = h.engine.handle(&content_id()).expect("stub handle");
    stub.complete();

    let completed = drain(&mut stream, Duration::from_millis(200))
        .await
        .into_iter()
        .filter(|event| matches!(event, Event::Completed { .. }))
        .count();
    assert_eq!(completed, 1);

    let stored = record(&h.store, &content_id()).await?;
    assert_eq!(stored.status, SessionStatus::Seeding);
    assert_eq!(stored.downloaded, 1_000);
    assert_eq!(stored.name, "Foo");
    assert!(stored.completed_at.is_some());
    Ok(())
}

#[tokio::test]
async fn engine_failures_surface_as_error_events() -> Result<()> {
    let h = harness(StubEngine::new()).await?;
    h.engine.fail_next_add("tracker unreachable");
    let mut stream = h.events.subscribe();
    h.registry.add(TorrentSource::link(link()), None).await?;

    let error = wait_for_event(&mut stream, |event| matches!(event, Event::Error { .. })).await?;
    let Event::Error { message, .. } = error else {
        bail!("expected error event");
    };
    assert!(message.contains("tracker unreachable"));

    let registry = h.registry.clone();
    wait_for("slot release", || !registry.is_engaged(&content_id())).await?;
    assert_eq!(
        record(&h.store, &content_id()).await?.status,
        SessionStatus::Error
    );
    Ok(())
}

#[tokio::test]
async fn runtime_failures_release_the_slot() -> Result<()> {
    let h = harness(StubEngine::new()).await?;
    h.registry.add(TorrentSource::link(link()), None).await?;
    let registry = h.registry.clone();
    wait_for("live handle", || registry.live_sessions() == 1).await?;

    let mut stream = h.events.subscribe();
    let stub = h.engine.handle(&content_id()).expect("stub handle");
    stub.fail("disk full");
    wait_for_event(&mut stream, |event| matches!(event, Event::Error { .. })).await?;

    let registry = h.registry.clone();
    wait_for("slot release", || !registry.is_engaged(&content_id())).await?;
    assert_eq!(stub.destroy_calls().len(), 1);
    assert_eq!(
        record(&h.store, &content_id()).await?.status,
        SessionStatus::Error
    );
    Ok(())
}

#[tokio::test]
async fn blob_sources_announce_once_parsed() -> Result<()> {
    let h = harness(StubEngine::new().with_metadata(foo_metadata())).await?;
    let mut stream = h.events.subscribe();
    let outcome = h
        .registry
        .add(TorrentSource::blob(HASH.as_bytes().to_vec()), None)
        .await?;
    assert_eq!(outcome, AddOutcome::Pending);

    let added = wait_for_event(&mut stream, |event| matches!(event, Event::Added { .. })).await?;
    assert_eq!(added.content_id(), &content_id());

    let stored = record(&h.store, &content_id()).await?;
    assert_eq!(stored.name, "Foo");
    assert_eq!(stored.total_size, 1_000);
    assert!(matches!(stored.source, Some(TorrentSource::Blob { .. })));
    Ok(())
}

#[tokio::test]
async fn restore_reattaches_active_sessions_only() -> Result<()> {
    let h = harness(StubEngine::new()).await?;
    let destination = h.downloads.path().to_path_buf();
    let hashes = ['b', 'c', 'd'];
    let ids: Vec<ContentId> = hashes
        .iter()
        .map(|c| ContentId::parse_hex(&c.to_string().repeat(40)).expect("valid id"))
        .collect();

    let mut active = SessionRecord::admitted(
        ids[0].clone(),
        "Active",
        TorrentSource::link(format!("magnet:?xt=urn:btih:{}", ids[0])),
        destination.clone(),
    );
    active.downloaded = 64;
    let mut paused = SessionRecord::admitted(
        ids[1].clone(),
        "Paused",
        TorrentSource::link(format!("magnet:?xt=urn:btih:{}", ids[1])),
        destination.clone(),
    );
    paused.status = SessionStatus::Paused;
    let mut orphan = SessionRecord::admitted(
        ids[2].clone(),
        "Orphan",
        TorrentSource::link(format!("magnet:?xt=urn:btih:{}", ids[2])),
        destination,
    );
    orphan.source = None;
    orphan.status = SessionStatus::Seeding;
    for record in [&active, &paused, &orphan] {
        h.store.upsert_session(record).await?;
    }

    let restored = h.registry.restore().await?;
    assert_eq!(restored, 1);
    let registry = h.registry.clone();
    wait_for("restored handle", || registry.live_sessions() == 1).await?;
    assert!(h.registry.is_engaged(&ids[0]));
    assert!(!h.registry.is_engaged(&ids[1]));
    assert!(!h.registry.is_engaged(&ids[2]));
    assert_eq!(h.store.list(&SessionFilter::default()).await?.len(), 3);
    assert_eq!(record(&h.store, &ids[0]).await?.downloaded, 64);
    Ok(())
}

#[tokio::test]
async fn shutdown_flushes_counters_and_status() -> Result<()> {
    let h = harness(StubEngine::new().with_metadata(foo_metadata())).await?;
    let other = ContentId::parse_hex(&"9".repeat(40))?;
    h.registry.add(TorrentSource::link(link()), None).await?;
    h.registry
        .add(
            TorrentSource::link(format!("magnet:?xt=urn:btih:{other}&dn=Done")),
            None,
        )
        .await?;
    let registry = h.registry.clone();
    wait_for("live handles", || registry.live_sessions() == 2).await?;

    let downloading = h.engine.handle(&content_id()).expect("stub handle");
    downloading.set_progress(700, 10);
    let done = h.engine.handle(&other).expect("stub handle");
    done.complete_silently();

    h.registry.shutdown().await;

    let first = record(&h.store, &content_id()).await?;
    assert_eq!(first.status, SessionStatus::Downloading);
    assert_eq!((first.downloaded, first.uploaded), (700, 10));
    let second = record(&h.store, &other).await?;
    assert_eq!(second.status, SessionStatus::Seeding);
    assert_eq!(second.downloaded, 1_000);
    assert_eq!(h.registry.live_sessions(), 0);
    assert_eq!(h.engine.live_handles(&content_id()), 0);
    assert_eq!(h.engine.live_handles(&other), 0);
    Ok(())
}

#[tokio::test]
async fn patches_and_listing_follow_the_store() -> Result<()> {
    let h = harness(StubEngine::new()).await?;
    h.registry.add(TorrentSource::link(link()), None).await?;
    h.registry.set_category(&content_id(), Some(7)).await?;
    h.registry.link_metadata(&content_id(), Some(42)).await?;

    let summary = h
        .registry
        .status(&content_id())
        .await?
        .ok_or_else(|| anyhow!("summary missing"))?;
    assert_eq!(summary.category_id, Some(7));
    assert_eq!(summary.external_id, Some(42));
    assert_eq!(summary.destination, h.downloads.path().to_string_lossy());

    let filtered = h
        .registry
        .list(SessionFilter {
            status: None,
            category_id: Some(7),
        })
        .await?;
    assert_eq!(filtered.len(), 1);
    let none = h
        .registry
        .list(SessionFilter {
            status: Some(SessionStatus::Paused),
            category_id: None,
        })
        .await?;
    assert!(none.is_empty());

    let unknown = ContentId::parse_hex(&"1".repeat(40))?;
    let err = h
        .registry
        .set_category(&unknown, Some(1))
        .await
        .expect_err("unknown id");
    assert!(matches!(err, TorrentError::NotFound { .. }));
    let err = h
        .registry
        .link_metadata(&unknown, None)
        .await
        .expect_err("unknown id");
    assert!(matches!(err, TorrentError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn payloads_complete_at_attach_are_seeding_without_an_announcement() -> Result<()> {
    let h = harness(
        StubEngine::new()
            .with_metadata(foo_metadata())
            .with_existing_payloads(),
    )
    .await?;
    let mut stream = h.events.subscribe();
    h.registry.add(TorrentSource::link(link()), None).await?;

    let store = h.store.clone();
    timeout(Duration::from_secs(5), async {
        loop {
            if record(&store, &content_id()).await?.status == SessionStatus::Seeding {
                return Ok::<_, anyhow::Error>(());
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await??;
    let stored = record(&h.store, &content_id()).await?;
    assert_eq!(stored.downloaded, 1_000);
    assert!(stored.completed_at.is_some());

    h.registry.pause(&content_id()).await?;
    assert_eq!(
        record(&h.store, &content_id()).await?.status,
        SessionStatus::Paused
    );
    h.registry.resume(&content_id()).await?;
    let store = h.store.clone();
    timeout(Duration::from_secs(5), async {
        loop {
            if record(&store, &content_id()).await?.status == SessionStatus::Seeding {
                return Ok::<_, anyhow::Error>(());
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await??;

    let completed = drain(&mut stream, Duration::from_millis(100))
        .await
        .into_iter()
        .filter(|event| matches!(event, Event::Completed { .. }))
        .count();
    assert_eq!(completed, 0);
    Ok(())
}

#[tokio::test]
async fn single_session_status_lists_live_files() -> Result<()> {
    let h = harness(StubEngine::new().with_metadata(foo_metadata())).await?;
    h.registry.add(TorrentSource::link(link()), None).await?;
    let registry = h.registry.clone();
    wait_for("live handle", || registry.live_sessions() == 1).await?;

    let summary = h
        .registry
        .status(&content_id())
        .await?
        .ok_or_else(|| anyhow!("summary missing"))?;
    assert_eq!(summary.files, foo_metadata().files);
    let rows = h.registry.list(SessionFilter::default()).await?;
    assert!(rows[0].files.is_empty(), "bulk rows carry no file lists");

    h.registry.pause(&content_id()).await?;
    let paused = h
        .registry
        .status(&content_id())
        .await?
        .ok_or_else(|| anyhow!("summary missing"))?;
    assert!(paused.files.is_empty());
    Ok(())
}

#[tokio::test]
async fn remove_survives_a_failing_payload_cleanup() -> Result<()> {
    let h = harness(StubEngine::new().with_metadata(foo_metadata())).await?;
    // A regular file as the destination makes every payload path invalid.
    let destination = h.downloads.path().join("not-a-directory");
    std::fs::write(&destination, b"occupied")?;

    h.registry
        .add(TorrentSource::link(link()), Some(destination.clone()))
        .await?;
    let registry = h.registry.clone();
    wait_for("live handle", || registry.live_sessions() == 1).await?;

    let mut stream = h.events.subscribe();
    h.registry
        .remove(&content_id(), RemoveOptions { delete_files: true })
        .await?;

    assert!(h.store.get(&content_id()).await?.is_none());
    assert!(destination.is_file());
    let removed = drain(&mut stream, Duration::from_millis(100))
        .await
        .into_iter()
        .filter(|event| matches!(event, Event::Removed { .. }))
        .count();
    assert_eq!(removed, 1);
    Ok(())
}

#[tokio::test]
async fn storage_failures_during_remove_keep_the_session_engaged() -> Result<()> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let store = RuntimeStore::new(pool.clone()).await?;
    let h = harness_with_store(StubEngine::new(), store).await?;
    h.registry.add(TorrentSource::link(link()), None).await?;
    let registry = h.registry.clone();
    wait_for("live handle", || registry.live_sessions() == 1).await?;

    let mut stream = h.events.subscribe();
    pool.close().await;
    let err = h
        .registry
        .remove(&content_id(), RemoveOptions::default())
        .await
        .expect_err("store unavailable");
    assert!(matches!(err, TorrentError::Storage { .. }));

    assert!(h.registry.is_engaged(&content_id()));
    assert_eq!(h.registry.live_sessions(), 1);
    assert_eq!(h.engine.live_handles(&content_id()), 1);
    let removed = drain(&mut stream, Duration::from_millis(50))
        .await
        .into_iter()
        .filter(|event| matches!(event, Event::Removed { .. }))
        .count();
    assert_eq!(removed, 0);

    let again = h
        .registry
        .add(TorrentSource::link(link()), None)
        .await?;
    assert!(matches!(again, AddOutcome::Existing(_)));
    assert_eq!(h.engine.admissions(), 1);
    Ok(())
}
