use crate::camera::Camera;
use crate::config::{Config, HistoryBackend, HistoryConfig};
use crate::engine::{ClassificationEngine, EngineOptions};
use crate::history::{HistoryStore, MemoryHistoryStore, RestHistoryStore};
use crate::model::HttpModelLoader;
use crate::server::{HttpServer, SharedState};
use crate::telemetry::Metrics;

use anyhow::Context;
use futures::StreamExt;
use std::sync::Arc;
use tokio::{signal, sync::broadcast};
use tokio_stream::wrappers::WatchStream;

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);

    let loader = HttpModelLoader::new(&config.model).map_err(|e| {
        tracing::error!("Failed to initialize model loader: {:?}", e);
        e
    })?;
    let store = history_store(&config.history)?;

    let engine = Arc::new(ClassificationEngine::new(
        Arc::new(loader),
        store,
        metrics.clone(),
        EngineOptions {
            scan_interval: config.scan.get_scan_interval(),
            history_limit: config.history.default_limit,
        },
    ));
    let camera = Arc::new(Camera::new());

    if config.model.load_on_startup {
        tokio::spawn({
            let engine = engine.clone();
            async move {
                if let Err(e) = engine.load_model().await {
                    tracing::error!("Model failed to load: {}", e);
                }
            }
        });
    }

    let state = SharedState {
        engine: engine.clone(),
        camera: camera.clone(),
        metrics,
    };
    let server = HttpServer::new(state, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    tokio::spawn(log_predictions(engine.clone(), shutdown_tx.subscribe()));

    let server_handle = server.run(server_shutdown_rx)?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    engine.stop_continuous_scan();
    camera.stop();
    let _ = server_handle.await;

    Ok(())
}

fn history_store(config: &HistoryConfig) -> anyhow::Result<Arc<dyn HistoryStore>> {
    match config.backend {
        HistoryBackend::Memory => Ok(Arc::new(MemoryHistoryStore::new())),
        HistoryBackend::Rest => {
            let rest_url = config.rest_url.as_deref().unwrap_or_default();
            let api_key = config.api_key.as_deref().unwrap_or_default();
            let store = RestHistoryStore::new(rest_url, api_key, config.get_request_timeout())?;
            Ok(Arc::new(store))
        }
    }
}

async fn log_predictions(engine: Arc<ClassificationEngine>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut updates = WatchStream::from_changes(engine.subscribe_predictions());

    loop {
        tokio::select! {
            update = updates.next() => {
                let Some(predictions) = update else { break };
                if let Some(top) = predictions.first() {
                    tracing::debug!(
                        label = %top.label,
                        probability = top.probability,
                        "Top prediction updated"
                    );
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
