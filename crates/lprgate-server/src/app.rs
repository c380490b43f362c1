//! Application state and HTTP router
//!
//! Routes:
//! - `POST /NotificationInfo/{TollgateInfo,KeepAlive,DeviceInfo}`: camera webhooks
//! - `GET  /api/records`: records listing (allow-listed)
//! - `GET  /api/health`: persistence status
//! - `GET  /static/captures/*`: stored capture images (allow-listed)
//! - `GET  /metrics`: Prometheus metrics

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, StatusCode, Uri, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::access::{AllowList, require_allowed_ip};
use crate::captures::CaptureStore;
use crate::handlers::{records, webhook};
use crate::health;
use crate::metrics::Metrics;
use lprgate_notify::RelayNotifier;
use lprgate_persistence::StorageManager;

/// Camera snapshots are embedded in the JSON body as base64
const WEBHOOK_BODY_LIMIT: usize = 32 * 1024 * 1024;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<StorageManager>,
    pub captures: CaptureStore,
    pub notifier: Option<Arc<RelayNotifier>>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(storage: Arc<StorageManager>, captures: CaptureStore, metrics: Arc<Metrics>) -> Self {
        Self {
            storage,
            captures,
            notifier: None,
            metrics,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<RelayNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }
}

/// Build the full router
pub fn router(state: AppState, allow_list: Arc<AllowList>) -> Router {
    let camera = Router::new()
        .route("/NotificationInfo/TollgateInfo", post(webhook::tollgate_info))
        .route("/NotificationInfo/KeepAlive", post(webhook::keep_alive))
        .route("/NotificationInfo/DeviceInfo", post(webhook::device_info))
        .layer(DefaultBodyLimit::max(WEBHOOK_BODY_LIMIT));

    let frontend = Router::new()
        .route("/api/records", get(records::list_records))
        .nest_service(
            "/static/captures",
            ServeDir::new(state.captures.directory().to_path_buf()),
        )
        .layer(middleware::from_fn_with_state(
            allow_list,
            require_allowed_ip,
        ));

    Router::new()
        .merge(camera)
        .merge(frontend)
        .route("/api/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .fallback(not_found)
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::PUT,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

async fn not_found(uri: Uri) -> Response {
    if uri.path().starts_with("/api/") {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"erro": "Rota não encontrada"})),
        )
            .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
            "Not Found",
        )
            .into_response()
    }
}
