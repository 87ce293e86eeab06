//! Keeps a [`SessionCache`] in step with the push channel.
//!
//! The cache is seeded by a bulk fetch and patched by deltas. Every time the
//! push client reaches `open` the list is refetched before queued deltas are
//! applied, so events missed while disconnected cannot leave stale rows.

use std::sync::Arc;

use riptide_events::{Event, EventKind};
use riptide_torrent_core::SessionSummary;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{CacheAction, SessionCache};
use crate::client::{Listener, PushClient, Subscription};
use crate::fetcher::SessionFetcher;

/// Background task that owns the cache and publishes its contents.
pub struct CacheReconciler {
    view: watch::Receiver<Vec<SessionSummary>>,
    subscriptions: Vec<Subscription>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl CacheReconciler {
    /// Register on every event kind and start reconciling.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(client: &PushClient, fetcher: Arc<dyn SessionFetcher>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let forward: Listener = Arc::new(move |event: &Event| {
            let _ = events_tx.send(event.clone());
        });
        let subscriptions = EventKind::ALL
            .into_iter()
            .map(|kind| client.on_shared(kind, Arc::clone(&forward)))
            .collect();

        let (view_tx, view) = watch::channel(Vec::new());
        let cancel = CancellationToken::new();
        let worker = Worker {
            client: client.clone(),
            fetcher,
            cache: SessionCache::new(),
            view: view_tx,
            seen_opens: 0,
        };
        let task = tokio::spawn(worker.run(events_rx, cancel.clone()));
        Self {
            view,
            subscriptions,
            cancel,
            task,
        }
    }

    /// Receiver that observes every published cache state.
    #[must_use]
    pub fn view(&self) -> watch::Receiver<Vec<SessionSummary>> {
        self.view.clone()
    }

    /// Current cache contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SessionSummary> {
        self.view.borrow().clone()
    }

    /// Unregister the listeners and stop the task.
    pub async fn shutdown(self) {
        for subscription in self.subscriptions {
            subscription.unregister();
        }
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            debug!(error = %err, "cache reconciler join failed");
        }
    }
}

struct Worker {
    client: PushClient,
    fetcher: Arc<dyn SessionFetcher>,
    cache: SessionCache,
    view: watch::Sender<Vec<SessionSummary>>,
    seen_opens: u64,
}

impl Worker {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>, cancel: CancellationToken) {
        let mut state = self.client.subscribe_state();
        self.refetch_if_reopened().await;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.refetch_if_reopened().await;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    // A reopen may have landed since the last state wakeup.
                    self.refetch_if_reopened().await;
                    self.apply(&event).await;
                }
            }
        }
    }

    async fn refetch_if_reopened(&mut self) {
        let opens = self.client.open_count();
        if opens != self.seen_opens {
            self.seen_opens = opens;
            self.refetch().await;
        }
    }

    async fn apply(&mut self, event: &Event) {
        match self.cache.apply(event) {
            CacheAction::Patched => self.publish(),
            CacheAction::Ignored => {
                debug!(kind = event.kind().as_str(), content_id = %event.content_id(), "event for unknown session ignored");
            }
            CacheAction::Refetch => self.refetch().await,
        }
    }

    async fn refetch(&mut self) {
        match self.fetcher.fetch_all().await {
            Ok(rows) => {
                self.cache.replace_all(rows);
                self.publish();
            }
            Err(err) => warn!(error = %err, "session refetch failed; keeping cached rows"),
        }
    }

    fn publish(&self) {
        self.view.send_replace(self.cache.entries().to_vec());
    }
}
