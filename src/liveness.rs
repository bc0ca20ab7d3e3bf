//! Tiny HTTP endpoint so the hosting platform can see the process is up.

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, routing::get, Router};
use tokio::sync::watch;
use tracing::info;

use crate::dispatch::ConnectionState;

fn router(state: watch::Receiver<ConnectionState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .with_state(state)
}

/// Always 200 while the process runs; the body carries the gateway state.
async fn health(State(state): State<watch::Receiver<ConnectionState>>) -> (StatusCode, String) {
    let current = *state.borrow();
    (StatusCode::OK, format!("ok ({current})"))
}

pub async fn serve(port: u16, state: watch::Receiver<ConnectionState>) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Liveness endpoint listening on {}", addr);
    axum::serve(listener, router(state))
        .await
        .context("Liveness server error")?;

    Ok(())
}
