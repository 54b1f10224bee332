use std::{future::Future, sync::Arc, time::Instant};

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tracing::info;

use super::{
    health::{gateway_health_handler, health_handler, store_health_handler, validation_handler},
    websocket::websocket_handler,
};
use crate::pipeline::Pipeline;

/// Shared state of the HTTP layer.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            started_at: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/vehicles", get(websocket_handler))
        .route("/health", get(health_handler))
        .route("/health/store", get(store_health_handler))
        .route("/health/gateway", get(gateway_health_handler))
        .route("/assets/{id}/validation", get(validation_handler))
        .with_state(state)
}

/// Serves until `shutdown` resolves, then stops accepting connections and
/// waits for in-flight requests.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{engine::TelemetryStore, pipeline::PipelineOptions};

    async fn get_json(
        app: Router,
        uri: &str,
    ) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn app() -> (Router, Arc<Pipeline>) {
        let pipeline = Pipeline::start(TelemetryStore::in_memory(), PipelineOptions::default()).unwrap();
        (router(AppState::new(pipeline.clone())), pipeline)
    }

    #[tokio::test]
    async fn test_health_routes() {
        let (app, pipeline) = app();

        let (status, body) = get_json(app.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = get_json(app.clone(), "/health/store").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["backend"], "memory");
        assert_eq!(body["corrupt_reads"], 0);

        let _client = pipeline.gateway.connect();
        let (status, body) = get_json(app, "/health/gateway").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected_clients"], 1);
        assert_eq!(body["status"], "healthy");
        assert!(body["bus"]["channels"].is_u64());

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_validation_route() {
        let (app, pipeline) = app();
        let (status, body) = get_json(app, "/assets/ghost/validation").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isValid"], false);
        assert_eq!(body["errors"][0], "Position data not found");
        pipeline.shutdown().await;
    }
}
