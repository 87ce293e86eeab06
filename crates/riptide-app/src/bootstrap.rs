use std::sync::Arc;

use riptide_api::{ApiServer, ApiState, StaticTokenVerifier};
use riptide_events::{DiscoveredFile, EventBus};
use riptide_runtime::RuntimeStore;
use riptide_telemetry::{LoggingConfig, Metrics};
use riptide_torrent_core::SessionInspector;
use riptide_torrent_core::stub::{StubEngine, StubMetadata};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::registry::SessionRegistry;

const SIMULATED_PAYLOAD_SIZE: u64 = 256 * 1024 * 1024;

/// Dependencies required to bootstrap the Riptide daemon.
pub(crate) struct BootstrapDependencies {
    config: AppConfig,
    events: EventBus,
    metrics: Metrics,
    store: RuntimeStore,
    engine: Arc<StubEngine>,
}

impl BootstrapDependencies {
    /// Construct production dependencies from the environment for the binary entrypoint.
    pub(crate) async fn from_env() -> AppResult<Self> {
        let config = AppConfig::from_env()?;

        tokio::fs::create_dir_all(&config.download_root)
            .await
            .map_err(|source| AppError::Io {
                operation: "download_root.create",
                path: Some(config.download_root.clone()),
                source,
            })?;

        let store = RuntimeStore::connect(&config.database_url)
            .await
            .map_err(|err| AppError::runtime("runtime_store.connect", err))?;
        let events = EventBus::new();
        let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        let engine = Arc::new(simulated_engine(config.simulated_rate));

        Ok(Self {
            config,
            events,
            metrics,
            store,
            engine,
        })
    }
}

/// Entry point for the Riptide boot sequence.
///
/// # Errors
///
/// Returns an error if dependency construction or application startup fails.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env().await?;
    Box::pin(run_app_with(dependencies)).await
}

/// Boot sequence that relies entirely on injected dependencies.
pub(crate) async fn run_app_with(dependencies: BootstrapDependencies) -> AppResult<()> {
    let BootstrapDependencies {
        config,
        events,
        metrics,
        store,
        engine,
    } = dependencies;

    let logging = LoggingConfig {
        level: &config.log_level,
        format: config.log_format,
        build_sha: riptide_telemetry::build_sha(),
    };
    riptide_telemetry::init_logging(&logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;

    info!("Riptide bootstrap starting");

    let registry = SessionRegistry::new(
        engine,
        store,
        events.clone(),
        Some(metrics.clone()),
        config.registry_settings(),
    );
    let restored = registry
        .restore()
        .await
        .map_err(|err| AppError::torrent("registry.restore", err))?;
    info!(restored, "session registry ready");

    let inspector: Arc<dyn SessionInspector> = Arc::new(registry.clone());
    let verifier = Arc::new(StaticTokenVerifier::new(config.api_token.clone()));
    let api = ApiServer::new(ApiState::new(inspector, events, verifier, metrics));

    info!(addr = %config.bind_addr, "Launching API listener");
    let serve_result = api.serve(config.bind_addr, shutdown_signal()).await;

    registry.shutdown().await;
    serve_result.map_err(|err| AppError::api_server("api_server.serve", err))?;
    info!("API server shutdown complete");
    Ok(())
}

/// Engine used by the daemon: resolves metadata immediately and downloads
/// every handle at `bytes_per_second`.
fn simulated_engine(bytes_per_second: u64) -> StubEngine {
    StubEngine::new()
        .with_simulated_transfer(bytes_per_second)
        .with_metadata(StubMetadata {
            name: None,
            files: vec![DiscoveredFile {
                name: "payload.bin".to_string(),
                length: SIMULATED_PAYLOAD_SIZE,
            }],
        })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("ctrl-c received; shutting down"),
        () = terminate => info!("SIGTERM received; shutting down"),
    }
}
