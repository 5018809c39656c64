//! WebSocket relay that lets peers share documents without a direct link.

pub mod api;

use anyhow::{Context, Result};

pub use api::{router, serve, AppState};

pub async fn start(bind: &str, port: u16) -> Result<()> {
    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding relay to {addr}"))?;
    serve(listener).await
}
