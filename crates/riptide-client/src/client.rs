//! Reconnecting push-channel subscriber.
//!
//! One task per client drives the state machine
//! `idle -> connecting -> open -> backoff(delay) -> connecting ...`.
//! Failures are absorbed: the task waits the current delay, doubles it up to
//! the ceiling and tries again, forever, until `disconnect` cancels it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use riptide_events::{Event, EventKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backoff::Backoff;
use crate::config::PushClientConfig;
use crate::transport::{Transport, WsTransport};

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying to.
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// Frames are flowing.
    Open,
    /// Waiting before the next attempt.
    Backoff {
        /// Time until the next attempt.
        delay: Duration,
    },
}

/// Callback invoked for every event of the kind it was registered for.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

type ListenerId = u64;

/// Handle returned by [`PushClient::on`].
#[must_use = "dropping a subscription keeps the listener registered; call `unregister` to remove it"]
pub struct Subscription {
    id: ListenerId,
    kind: EventKind,
    client: Weak<ClientInner>,
}

impl Subscription {
    /// Remove the listener. A no-op once the client itself is gone.
    pub fn unregister(self) {
        if let Some(inner) = self.client.upgrade() {
            inner.remove_listener(self.kind, self.id);
        }
    }
}

struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct ClientInner {
    config: PushClientConfig,
    transport: Arc<dyn Transport>,
    listeners: Mutex<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
    next_listener: AtomicU64,
    opened: AtomicU64,
    state: watch::Sender<ConnectionState>,
    run: Mutex<Option<RunHandle>>,
}

/// Push-channel client with automatic reconnection.
#[derive(Clone)]
pub struct PushClient {
    inner: Arc<ClientInner>,
}

impl PushClient {
    /// Client using the WebSocket transport.
    #[must_use]
    pub fn new(config: PushClientConfig) -> Self {
        Self::with_transport(config, Arc::new(WsTransport))
    }

    /// Client using a caller-supplied transport.
    #[must_use]
    pub fn with_transport(config: PushClientConfig, transport: Arc<dyn Transport>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                listeners: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(1),
                opened: AtomicU64::new(0),
                state,
                run: Mutex::new(None),
            }),
        }
    }

    /// Start the connection task. Calling it while the task runs is a no-op.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        let mut run = self.inner.lock_run();
        if run.as_ref().is_some_and(|handle| !handle.task.is_finished()) {
            return;
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_connection(Arc::clone(&self.inner), cancel.clone()));
        *run = Some(RunHandle { cancel, task });
    }

    /// Stop the connection task and suppress further reconnects.
    pub async fn disconnect(&self) {
        let handle = self.inner.lock_run().take();
        let Some(handle) = handle else {
            return;
        };
        handle.cancel.cancel();
        if let Err(err) = handle.task.await {
            debug!(error = %err, "push client task join failed");
        }
        self.inner.state.send_replace(ConnectionState::Idle);
    }

    /// Register a listener for one event kind.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.on_shared(kind, Arc::new(listener))
    }

    /// Register an already shared listener, e.g. one callback for several kinds.
    pub fn on_shared(&self, kind: EventKind, listener: Listener) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner
            .lock_listeners()
            .entry(kind)
            .or_default()
            .push((id, listener));
        Subscription {
            id,
            kind,
            client: Arc::downgrade(&self.inner),
        }
    }

    /// Watch state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Number of times a connection reached `open`.
    ///
    /// Lets observers detect every reopen even when watch updates coalesce.
    #[must_use]
    pub fn open_count(&self) -> u64 {
        self.inner.opened.load(Ordering::Acquire)
    }
}

impl ClientInner {
    fn lock_run(&self) -> MutexGuard<'_, Option<RunHandle>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, HashMap<EventKind, Vec<(ListenerId, Listener)>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_listener(&self, kind: EventKind, id: ListenerId) {
        let mut listeners = self.lock_listeners();
        if let Some(registered) = listeners.get_mut(&kind) {
            registered.retain(|(existing, _)| *existing != id);
            if registered.is_empty() {
                listeners.remove(&kind);
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn dispatch(&self, frame: &str) {
        let event = match Event::from_frame(frame) {
            Ok(event) => event,
            Err(err) => {
                debug!(error = %err, "dropping malformed push frame");
                return;
            }
        };
        let targets: Vec<Listener> = self
            .lock_listeners()
            .get(&event.kind())
            .map(|registered| registered.iter().map(|(_, listener)| Arc::clone(listener)).collect())
            .unwrap_or_default();
        for listener in targets {
            listener(&event);
        }
    }
}

async fn run_connection(inner: Arc<ClientInner>, cancel: CancellationToken) {
    let mut backoff = Backoff::new(inner.config.base_delay, inner.config.max_delay);
    'reconnect: loop {
        inner.set_state(ConnectionState::Connecting);
        let attempt = tokio::select! {
            () = cancel.cancelled() => break 'reconnect,
            attempt = inner.transport.connect(&inner.config) => attempt,
        };
        match attempt {
            Ok(mut connection) => {
                backoff.reset();
                inner.opened.fetch_add(1, Ordering::AcqRel);
                inner.set_state(ConnectionState::Open);
                info!(url = %inner.config.url, "push channel open");
                loop {
                    let next = tokio::select! {
                        () = cancel.cancelled() => break 'reconnect,
                        next = connection.next_frame() => next,
                    };
                    match next {
                        Ok(Some(frame)) => inner.dispatch(&frame),
                        Ok(None) => {
                            debug!("push channel closed");
                            break;
                        }
                        Err(err) => {
                            debug!(error = %err, "push channel failed");
                            break;
                        }
                    }
                }
            }
            Err(err) => debug!(error = %err, "push channel connect failed"),
        }

        let delay = backoff.next_delay();
        inner.set_state(ConnectionState::Backoff { delay });
        tokio::select! {
            () = cancel.cancelled() => break 'reconnect,
            () = sleep(delay) => {}
        }
    }
    inner.set_state(ConnectionState::Idle);
}
