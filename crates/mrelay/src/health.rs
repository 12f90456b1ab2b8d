//! Liveness endpoint for the hosting platform. Independent of engine state.

use axum::{routing::get, Router};

async fn ok() -> &'static str {
    "OK"
}

pub fn router() -> Router {
    Router::new().route("/", get(ok)).route("/health", get(ok))
}

pub async fn serve(port: u16) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "health server listening");
    axum::serve(listener, router()).await
}
