//! Shared API state.

use std::sync::Arc;

use riptide_events::EventBus;
use riptide_telemetry::Metrics;
use riptide_torrent_core::SessionInspector;

use crate::auth::CredentialVerifier;
use crate::http::constants::PUSH_CONNECTION_BUFFER;
use crate::push::PushHub;

/// Dependencies shared by every handler.
#[derive(Clone)]
pub struct ApiState {
    pub(crate) inspector: Arc<dyn SessionInspector>,
    pub(crate) events: EventBus,
    pub(crate) verifier: Arc<dyn CredentialVerifier>,
    pub(crate) metrics: Metrics,
    pub(crate) push: PushHub,
}

impl ApiState {
    /// Bundle the read side of the registry, the bus and the credential check.
    #[must_use]
    pub fn new(
        inspector: Arc<dyn SessionInspector>,
        events: EventBus,
        verifier: Arc<dyn CredentialVerifier>,
        metrics: Metrics,
    ) -> Self {
        let push = PushHub::new(PUSH_CONNECTION_BUFFER, metrics.clone());
        Self {
            inspector,
            events,
            verifier,
            metrics,
            push,
        }
    }

    /// Hub holding the open push connections.
    #[must_use]
    pub const fn push_hub(&self) -> &PushHub {
        &self.push
    }
}
