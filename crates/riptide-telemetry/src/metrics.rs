//! Prometheus collectors for session and push-channel activity.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Shared metrics registry.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    events_published_total: IntCounterVec,
    live_sessions: IntGauge,
    push_connections: IntGauge,
    push_dropped_total: IntCounter,
    counter_flushes_total: IntCounter,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Sessions with a live engine handle.
    pub live_sessions: i64,
    /// Open push-channel connections.
    pub push_connections: i64,
    /// Connections dropped after a failed delivery.
    pub push_dropped_total: u64,
    /// Throttled counter writes issued by samplers.
    pub counter_flushes_total: u64,
}

impl Metrics {
    /// Construct a new registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any collector cannot be built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let events_published_total = IntCounterVec::new(
            Opts::new(
                "riptide_events_published_total",
                "Domain events published by type",
            ),
            &["type"],
        )
        .map_err(|source| register_error("riptide_events_published_total", source))?;
        let live_sessions = IntGauge::with_opts(Opts::new(
            "riptide_live_sessions",
            "Sessions with a live engine handle",
        ))
        .map_err(|source| register_error("riptide_live_sessions", source))?;
        let push_connections = IntGauge::with_opts(Opts::new(
            "riptide_push_connections",
            "Open push-channel connections",
        ))
        .map_err(|source| register_error("riptide_push_connections", source))?;
        let push_dropped_total = IntCounter::with_opts(Opts::new(
            "riptide_push_dropped_total",
            "Push connections dropped after a failed delivery",
        ))
        .map_err(|source| register_error("riptide_push_dropped_total", source))?;
        let counter_flushes_total = IntCounter::with_opts(Opts::new(
            "riptide_counter_flushes_total",
            "Throttled counter writes issued by samplers",
        ))
        .map_err(|source| register_error("riptide_counter_flushes_total", source))?;

        registry
            .register(Box::new(events_published_total.clone()))
            .map_err(|source| register_error("riptide_events_published_total", source))?;
        registry
            .register(Box::new(live_sessions.clone()))
            .map_err(|source| register_error("riptide_live_sessions", source))?;
        registry
            .register(Box::new(push_connections.clone()))
            .map_err(|source| register_error("riptide_push_connections", source))?;
        registry
            .register(Box::new(push_dropped_total.clone()))
            .map_err(|source| register_error("riptide_push_dropped_total", source))?;
        registry
            .register(Box::new(counter_flushes_total.clone()))
            .map_err(|source| register_error("riptide_counter_flushes_total", source))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                events_published_total,
                live_sessions,
                push_connections,
                push_dropped_total,
                counter_flushes_total,
            }),
        })
    }

    /// Increment the published event counter for the event type.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
            .events_published_total
            .with_label_values(&[event_type])
            .inc();
    }

    /// Set the live session gauge.
    pub fn set_live_sessions(&self, count: usize) {
        self.inner
            .live_sessions
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Record a newly opened push connection.
    pub fn push_connection_opened(&self) {
        self.inner.push_connections.inc();
    }

    /// Record a closed push connection.
    pub fn push_connection_closed(&self) {
        self.inner.push_connections.dec();
    }

    /// Record a connection dropped after a failed delivery.
    pub fn inc_push_dropped(&self) {
        self.inner.push_dropped_total.inc();
    }

    /// Record a throttled counter write.
    pub fn inc_counter_flush(&self) {
        self.inner.counter_flushes_total.inc();
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.inner.registry.gather(), &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Capture a snapshot of the gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            live_sessions: self.inner.live_sessions.get(),
            push_connections: self.inner.push_connections.get(),
            push_dropped_total: self.inner.push_dropped_total.get(),
            counter_flushes_total: self.inner.counter_flushes_total.get(),
        }
    }
}

const fn register_error(name: &'static str, source: prometheus::Error) -> TelemetryError {
    TelemetryError::MetricsRegister { name, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_and_snapshot() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_event("progress");
        metrics.set_live_sessions(3);
        metrics.push_connection_opened();
        metrics.push_connection_opened();
        metrics.push_connection_closed();
        metrics.inc_push_dropped();
        metrics.inc_counter_flush();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.live_sessions, 3);
        assert_eq!(snapshot.push_connections, 1);
        assert_eq!(snapshot.push_dropped_total, 1);
        assert_eq!(snapshot.counter_flushes_total, 1);

        let rendered = metrics.render()?;
        assert!(rendered.contains("riptide_events_published_total{type=\"progress\"} 1"));
        assert!(rendered.contains("riptide_live_sessions 3"));
        Ok(())
    }
}
