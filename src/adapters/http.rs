//! Health endpoint served next to each component.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Health {
    pub service: String,
    pub status: &'static str,
}

async fn health(State(service): State<String>) -> Json<Health> {
    Json(Health {
        service,
        status: "ok",
    })
}

pub fn router(service: impl Into<String>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(service.into())
}

pub async fn serve_health<F>(
    service: impl Into<String>,
    listener: TcpListener,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "health endpoint listening");
    }
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}
