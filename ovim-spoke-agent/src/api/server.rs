//! Local HTTP API the hub talks to: it pushes operations here and the
//! agent reports health/status for direct inspection (port-forward, probes).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use ovim_common::{metrics::MetricsLayer, request_context, response};
use ovim_types::{Operation, StatusReport};
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub struct AppState {
    pub inbound: mpsc::Sender<Operation>,
    pub status: RwLock<StatusReport>,
    pub hub_reachable: AtomicBool,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/operations", post(accept_operation))
        .route("/metrics", get(metrics))
        .layer(MetricsLayer::new("spoke-agent"))
        .layer(middleware::from_fn(request_context::attach))
        .with_state(state)
}

pub async fn run(address: &str, port: u16, state: Arc<AppState>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind((address, port)).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let healthy = state.hub_reachable.load(Ordering::Relaxed);
    let body = serde_json::json!({ "status": if healthy { "healthy" } else { "degraded" } });
    (if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE }, Json(body))
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.status.read().await.clone())
}

async fn accept_operation(State(state): State<Arc<AppState>>, Json(op): Json<Operation>) -> axum::response::Response {
    match state.inbound.try_send(op) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("operation channel full, rejecting pushed operation");
            response::service_unavailable("operation queue full")
        }
        Err(mpsc::error::TrySendError::Closed(_)) => response::internal_server_error("operation processor not running"),
    }
}

async fn metrics() -> impl IntoResponse {
    ovim_common::metrics::render()
}
