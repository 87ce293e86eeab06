//! Fan-out of bus events to push-channel connections.
//!
//! Every event is serialised once and offered to each open connection through
//! a bounded queue. Offers never wait: a connection whose queue is full or
//! whose socket task has gone away is dropped from the active set on the spot
//! and its socket is closed once its writer sees the queue end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::ws::Utf8Bytes;
use riptide_events::EventStream;
use riptide_telemetry::Metrics;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

/// Identifier assigned to a registered connection.
pub type ConnectionId = u64;

/// Registry of open push connections.
#[derive(Clone)]
pub struct PushHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    connections: Mutex<HashMap<ConnectionId, mpsc::Sender<Utf8Bytes>>>,
    next_id: AtomicU64,
    buffer: usize,
    metrics: Metrics,
}

impl PushHub {
    /// Create a hub whose connections buffer at most `buffer` frames.
    #[must_use]
    pub fn new(buffer: usize, metrics: Metrics) -> Self {
        Self {
            inner: Arc::new(HubInner {
                connections: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
                metrics,
            }),
        }
    }

    /// Add a connection and return the queue its writer should drain.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<Utf8Bytes>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.inner.buffer);
        self.connections().insert(id, sender);
        self.inner.metrics.push_connection_opened();
        debug!(connection_id = id, "push connection registered");
        (id, receiver)
    }

    /// Remove a connection; a no-op when the hub already dropped it.
    pub fn unregister(&self, id: ConnectionId) {
        let removed = self.connections().remove(&id);
        if removed.is_some() {
            self.inner.metrics.push_connection_closed();
            debug!(connection_id = id, "push connection unregistered");
        }
    }

    /// Offer a frame to every open connection; returns how many accepted it.
    pub fn broadcast(&self, frame: &Utf8Bytes) -> usize {
        let mut connections = self.connections();
        let before = connections.len();
        connections.retain(|id, sender| match sender.try_send(frame.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(connection_id = *id, "push connection fell behind; dropping");
                self.inner.metrics.inc_push_dropped();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });
        let delivered = connections.len();
        drop(connections);
        for _ in delivered..before {
            self.inner.metrics.push_connection_closed();
        }
        delivered
    }

    /// Number of connections currently in the active set.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections().len()
    }

    /// Forward events from the bus until the stream ends.
    pub async fn forward(self, mut events: EventStream) {
        while let Some(next) = events.next().await {
            match next {
                Ok(event) => match event.to_frame() {
                    Ok(frame) => {
                        let _ = self.broadcast(&Utf8Bytes::from(frame));
                    }
                    Err(err) => {
                        warn!(error = %err, kind = event.kind().as_str(), "failed to encode event frame");
                    }
                },
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "push forwarder lagged behind the event bus");
                }
            }
        }
        debug!("event bus closed; push forwarder stopping");
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<ConnectionId, mpsc::Sender<Utf8Bytes>>> {
        self.inner
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
