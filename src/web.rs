//! Axum-based read-only HTTP status service

use crate::driver::DriverSnapshot;
use crate::error::{LadningError, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub snapshot: watch::Receiver<Arc<DriverSnapshot>>,
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn status(State(state): State<AppState>) -> Response {
    let snapshot = state.snapshot.borrow().clone();
    let mut root = match serde_json::to_value(snapshot.as_ref()) {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response();
        }
    };
    root["version"] = serde_json::json!(env!("LADNING_VERSION"));
    Json(root).into_response()
}

async fn electricity_prices(State(state): State<AppState>) -> Response {
    let snapshot = state.snapshot.borrow().clone();
    match snapshot.prices.as_ref() {
        Some(prices) => Json(prices.clone()).into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            "Electricity prices not available yet",
        )
            .into_response(),
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/electricity_prices", get(electricity_prices))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(
    snapshot: watch::Receiver<Arc<DriverSnapshot>>,
    host: &str,
    port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    let router = build_router(AppState { snapshot });

    let logger = crate::logging::get_logger("web");
    logger.info(&format!(
        "Starting web server; requested host={}, port={}",
        host, port
    ));

    let addr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!(
                "Invalid host '{}'; falling back to 127.0.0.1",
                host
            ));
            ([127, 0, 0, 1], port).into()
        }
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| LadningError::web(format!("cannot bind {}: {}", addr, e)))?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{}",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| LadningError::web(e.to_string()))?;
    Ok(())
}
