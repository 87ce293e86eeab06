//! Router construction and server host for the API.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, http::Request, middleware, routing::get};
use riptide_telemetry::build_sha;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::error::{ApiServerError, ApiServerResult};
use crate::http::auth::require_credential;
use crate::http::constants::HEADER_REQUEST_ID;
use crate::http::health::metrics;
use crate::http::push::push_channel;
use crate::http::sessions::{get_session, list_sessions};
use crate::state::ApiState;

/// Axum router wrapper that hosts the Riptide API services.
pub struct ApiServer {
    router: Router,
    state: Arc<ApiState>,
}

impl ApiServer {
    /// Construct the server around shared state.
    #[must_use]
    pub fn new(state: ApiState) -> Self {
        let state = Arc::new(state);
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(HEADER_REQUEST_ID)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    route = %request.uri().path(),
                    request_id = %request_id,
                    build_sha = %build_sha(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty
                )
            })
            .on_request(|_request: &Request<_>, _span: &Span| {})
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &Span| {
                    span.record("status_code", response.status().as_u16());
                    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                    span.record("latency_ms", latency_ms);
                },
            );

        let router = Self::build_router(&state)
            .route_layer(ServiceBuilder::new().layer(trace_layer))
            .with_state(Arc::clone(&state));

        Self { router, state }
    }

    fn build_router(state: &Arc<ApiState>) -> Router<Arc<ApiState>> {
        let require_api = middleware::from_fn_with_state(Arc::clone(state), require_credential);

        Router::new()
            .route("/metrics", get(metrics))
            .route("/v1/events/ws", get(push_channel))
            .route(
                "/v1/sessions",
                get(list_sessions).route_layer(require_api.clone()),
            )
            .route(
                "/v1/sessions/{id}",
                get(get_session).route_layer(require_api),
            )
    }

    /// Bind `addr` and serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or the server terminates unexpectedly.
    pub async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> ApiServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ApiServerError::Bind { addr, source })?;
        self.serve_listener(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    ///
    /// The push forwarder runs for exactly as long as the server does.
    ///
    /// # Errors
    ///
    /// Returns an error if the server terminates unexpectedly.
    pub async fn serve_listener<F>(self, listener: TcpListener, shutdown: F) -> ApiServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(addr = %addr, "Starting API");
        }
        let forwarder = tokio::spawn(
            self.state
                .push
                .clone()
                .forward(self.state.events.subscribe()),
        );
        let result = axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|source| ApiServerError::Serve { source });
        forwarder.abort();
        result
    }

    #[cfg(test)]
    pub(crate) fn router(&self) -> Router {
        self.router.clone()
    }
}
