//! Health and metrics endpoints

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use prometheus::TextEncoder;
use serde::Serialize;

use crate::app::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: DatabaseStatus,
}

#[derive(Debug, Serialize)]
pub struct DatabaseStatus {
    /// `local`, `durable` or `uninitialized`
    pub mode: &'static str,
    /// What the promotion monitor is doing right now
    pub phase: &'static str,
    pub local_path: String,
    pub durable_reachable: bool,
}

/// `GET /api/health`
///
/// Always 200 while the process is serving; the body says which store is
/// active and whether the durable store currently answers.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let storage = &state.storage;
    Json(HealthResponse {
        status: "ok",
        database: DatabaseStatus {
            mode: storage.mode().map(|m| m.as_str()).unwrap_or("uninitialized"),
            phase: storage.phase().as_str(),
            local_path: storage.local_location(),
            durable_reachable: storage.durable_reachable().await,
        },
    })
}

/// Prometheus metrics handler
///
/// Returns metrics in Prometheus text format
pub async fn metrics(State(state): State<AppState>) -> Response {
    state
        .metrics
        .observe_storage(state.storage.mode(), &state.storage.stats());

    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry().gather();

    match encoder.encode_to_string(&metric_families) {
        Ok(body) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", err),
        )
            .into_response(),
    }
}
