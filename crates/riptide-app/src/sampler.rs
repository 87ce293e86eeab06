//! Per-session sampling task.
//!
//! One task runs for every live handle. It is the only writer for its id while
//! the handle is engaged: periodic progress samples, throttled counter flushes,
//! engine alerts and the completion latch all funnel through it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use riptide_events::{ContentId, Event, EventBus, ProgressSnapshot};
use riptide_runtime::RuntimeStore;
use riptide_telemetry::Metrics;
use riptide_torrent_core::{DestroyOptions, EngineAlert, EngineHandle, HandleStats, SessionStatus};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::table::{self, Generation, SharedTable};

/// Default period between samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
/// Default number of samples between counter flushes.
pub const DEFAULT_FLUSH_EVERY: u32 = 5;

/// Throttles counter persistence to every Nth sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    every: u32,
    ticks: u32,
}

impl FlushPolicy {
    /// Flush on every `every`th tick; zero is treated as one.
    #[must_use]
    pub const fn every(every: u32) -> Self {
        Self {
            every: if every == 0 { 1 } else { every },
            ticks: 0,
        }
    }

    /// Count a tick, returning whether this tick should persist.
    pub const fn record_tick(&mut self) -> bool {
        self.ticks += 1;
        if self.ticks >= self.every {
            self.ticks = 0;
            true
        } else {
            false
        }
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::every(DEFAULT_FLUSH_EVERY)
    }
}

/// Fires once per live handle.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CompletionLatch {
    fired: bool,
}

impl CompletionLatch {
    /// A latch that starts fired; used for handles already complete at attach.
    pub(crate) const fn primed(fired: bool) -> Self {
        Self { fired }
    }

    pub(crate) const fn try_fire(&mut self) -> bool {
        if self.fired {
            return false;
        }
        self.fired = true;
        true
    }

    pub(crate) const fn has_fired(self) -> bool {
        self.fired
    }
}

/// Publishes to the bus and counts what was published.
#[derive(Clone)]
pub(crate) struct Emitter {
    events: EventBus,
    metrics: Option<Metrics>,
}

impl Emitter {
    pub(crate) const fn new(events: EventBus, metrics: Option<Metrics>) -> Self {
        Self { events, metrics }
    }

    pub(crate) fn emit(&self, event: Event) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_event(event.kind().as_str());
        }
        let receivers = self.events.publish(event);
        if receivers == 0 {
            debug!("event published with no subscribers");
        }
    }

    pub(crate) const fn metrics(&self) -> Option<&Metrics> {
        self.metrics.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

pub(crate) struct SessionSampler {
    content_id: ContentId,
    handle: Arc<dyn EngineHandle>,
    store: RuntimeStore,
    emitter: Emitter,
    policy: FlushPolicy,
    completion: CompletionLatch,
}

impl SessionSampler {
    pub(crate) fn new(
        handle: Arc<dyn EngineHandle>,
        store: RuntimeStore,
        emitter: Emitter,
        policy: FlushPolicy,
    ) -> Self {
        let already_done = handle.stats().done;
        Self {
            content_id: handle.content_id().clone(),
            handle,
            store,
            emitter,
            policy,
            completion: CompletionLatch::primed(already_done),
        }
    }

    /// Drive the session until cancelled or until the handle goes away.
    pub(crate) async fn run(
        mut self,
        mut alerts: mpsc::UnboundedReceiver<EngineAlert>,
        cancel: CancellationToken,
        period: Duration,
        table: SharedTable,
        generation: Generation,
    ) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut alerts_open = true;
        self.settle_attach().await;

        loop {
            let flow = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                alert = alerts.recv(), if alerts_open => match alert {
                    Some(alert) => self.handle_alert(alert).await,
                    None => {
                        alerts_open = false;
                        Flow::Continue
                    }
                },
                _ = ticker.tick() => self.tick().await,
            };
            if flow == Flow::Stop {
                break;
            }
        }

        if cancel.is_cancelled() {
            debug!(content_id = %self.content_id, "session sampler cancelled");
            return;
        }
        let released = table::lock(&table).release(&self.content_id, generation);
        if released {
            if let Some(metrics) = self.emitter.metrics() {
                metrics.set_live_sessions(table::lock(&table).live_count());
            }
            debug!(content_id = %self.content_id, "session sampler released its slot");
        }
    }

    /// Persist seeding for a handle that was already complete when it attached.
    ///
    /// Completion was reached before this handle existed, so no `completed`
    /// event is emitted.
    pub(crate) async fn settle_attach(&self) {
        if !self.completion.has_fired() {
            return;
        }
        let stats = self.handle.stats();
        if let Err(err) = self
            .store
            .mark_completed(&self.content_id, stats.downloaded, stats.uploaded, Utc::now())
            .await
        {
            warn!(error = %err, content_id = %self.content_id, "failed to persist seeding at attach");
        }
        debug!(content_id = %self.content_id, "payload complete at attach; seeding");
    }

    /// Take one sample: publish progress, latch completion, flush on cadence.
    pub(crate) async fn tick(&mut self) -> Flow {
        if self.handle.is_destroyed() {
            debug!(content_id = %self.content_id, "handle destroyed; stopping sampler");
            return Flow::Stop;
        }

        let stats = self.handle.stats();
        self.emitter
            .emit(Event::Progress(snapshot(&self.content_id, &stats)));

        if stats.done {
            self.complete(&stats).await;
        }

        if self.policy.record_tick() {
            match self
                .store
                .update_counters(&self.content_id, stats.downloaded, stats.uploaded)
                .await
            {
                Ok(_) => {
                    if let Some(metrics) = self.emitter.metrics() {
                        metrics.inc_counter_flush();
                    }
                }
                Err(err) => warn!(
                    error = %err,
                    content_id = %self.content_id,
                    "failed to persist session counters"
                ),
            }
        }
        Flow::Continue
    }

    pub(crate) async fn handle_alert(&mut self, alert: EngineAlert) -> Flow {
        match alert {
            EngineAlert::MetadataResolved {
                name,
                total_size,
                files,
            } => {
                if let Err(err) = self
                    .store
                    .record_metadata(&self.content_id, &name, total_size)
                    .await
                {
                    warn!(error = %err, content_id = %self.content_id, "failed to record metadata");
                }
                info!(content_id = %self.content_id, name = %name, total_size, "metadata resolved");
                self.emitter.emit(Event::MetadataResolved {
                    content_id: self.content_id.clone(),
                    name,
                    total_size,
                    files,
                });
                Flow::Continue
            }
            EngineAlert::Verifying => {
                self.set_status(SessionStatus::Checking).await;
                Flow::Continue
            }
            EngineAlert::Verified => {
                if !self.completion.has_fired() {
                    self.set_status(SessionStatus::Downloading).await;
                }
                Flow::Continue
            }
            EngineAlert::Done => {
                let stats = self.handle.stats();
                self.complete(&stats).await;
                Flow::Continue
            }
            EngineAlert::Failed { message } => {
                self.fail(message).await;
                Flow::Stop
            }
        }
    }

    async fn complete(&mut self, stats: &HandleStats) {
        if !self.completion.try_fire() {
            return;
        }
        if let Err(err) = self
            .store
            .mark_completed(&self.content_id, stats.downloaded, stats.uploaded, Utc::now())
            .await
        {
            warn!(error = %err, content_id = %self.content_id, "failed to persist completion");
        }
        info!(content_id = %self.content_id, "session completed");
        self.emitter.emit(Event::Completed {
            content_id: self.content_id.clone(),
        });
    }

    async fn fail(&self, message: String) {
        warn!(content_id = %self.content_id, error = %message, "engine reported failure");
        self.set_status(SessionStatus::Error).await;
        self.emitter.emit(Event::Error {
            content_id: self.content_id.clone(),
            message,
        });
        if let Err(err) = self.handle.destroy(DestroyOptions::default()).await {
            warn!(error = %err, content_id = %self.content_id, "failed to destroy failed handle");
        }
    }

    async fn set_status(&self, status: SessionStatus) {
        if let Err(err) = self.store.set_status(&self.content_id, status).await {
            warn!(
                error = %err,
                content_id = %self.content_id,
                status = %status,
                "failed to persist session status"
            );
        }
    }
}

fn snapshot(content_id: &ContentId, stats: &HandleStats) -> ProgressSnapshot {
    ProgressSnapshot {
        content_id: content_id.clone(),
        downloaded: stats.downloaded,
        uploaded: stats.uploaded,
        download_rate: stats.download_rate,
        upload_rate: stats.upload_rate,
        fraction_complete: stats.fraction_complete,
        peer_count: stats.peer_count,
        eta_seconds: stats.eta_seconds,
    }
}
