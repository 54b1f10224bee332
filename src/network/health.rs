use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use super::AppState;
use crate::sync::ValidationReport;

/// `GET /health`: liveness.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /health/store`: pings the cache backend.
pub async fn store_health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let store = &state.pipeline.store;
    match store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "backend": store.backend_name(),
                "corrupt_reads": store.corrupt_reads(),
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "backend": store.backend_name(),
                "corrupt_reads": store.corrupt_reads(),
                "error": e.to_string(),
            })),
        ),
    }
}

/// `GET /health/gateway`: connection and delivery counters.
pub async fn gateway_health_handler(State(state): State<AppState>) -> Json<Value> {
    let pipeline = &state.pipeline;
    let gw = pipeline.gateway.stats();
    let bus = pipeline.bus.stats();
    let bridge = pipeline.bridge.stats();
    let sync = pipeline.sync.stats();
    Json(json!({
        "status": if pipeline.bridge.is_running() { "healthy" } else { "degraded" },
        "connected_clients": gw.connected,
        "total_connections": gw.total_connections,
        "delivered": gw.delivered,
        "dropped": gw.dropped,
        "bus": {
            "published": bus.published,
            "dropped": bus.dropped,
            "malformed": bus.malformed,
            "lagged": bus.lagged,
            "undelivered": bus.undelivered,
            "channels": bus.channels,
        },
        "bridge": {
            "routed": bridge.routed,
            "rejected": bridge.rejected,
            "refreshed": bridge.refreshed,
        },
        "sync": {
            "running": pipeline.sync.is_periodic_running(),
            "completed": sync.completed,
            "skipped": sync.skipped,
            "failed": sync.failed,
        },
    }))
}

/// `GET /assets/{id}/validation`: freshness and health of one asset.
pub async fn validation_handler(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
) -> Json<ValidationReport> {
    Json(state.pipeline.sync.validate_asset(&asset_id).await)
}
