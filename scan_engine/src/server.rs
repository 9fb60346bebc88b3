use crate::{
    camera::Camera, config::ServerConfig, engine::ClassificationEngine, routes::api_routes,
    telemetry::Metrics,
};
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::{self, Next},
    response::Response,
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};

#[derive(Clone)]
pub struct SharedState {
    pub engine: Arc<ClassificationEngine>,
    pub camera: Arc<Camera>,
    pub metrics: Arc<Metrics>,
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

async fn track_requests(State(metrics): State<Arc<Metrics>>, request: Request, next: Next) -> Response {
    if let Some(path) = request.extensions().get::<MatchedPath>() {
        metrics.record_request(path.as_str());
    }
    next.run(request).await
}

impl HttpServer {
    pub async fn new(state: SharedState, config: &ServerConfig) -> anyhow::Result<Self> {
        let addr = config.get_address();

        let router = Router::new()
            .merge(api_routes(config.max_upload_bytes))
            .route_layer(middleware::from_fn_with_state(
                state.metrics.clone(),
                track_requests,
            ))
            .with_state(state);

        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn run(self, shutdown_rx: Receiver<()>) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}
