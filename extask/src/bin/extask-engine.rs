//! Serves an in-memory external task engine over HTTP.
//!
//! ```text
//! EXTASK_BIND_ADDR=0.0.0.0:8080 RUST_LOG=extask=debug extask-engine
//! ```
//!
//! Routes are mounted under `/engine-rest`.

use axum::Router;
use extask::rest;
use extask::storage::InMemoryTaskStore;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bind_addr = std::env::var("EXTASK_BIND_ADDR").unwrap_or_else(|_| {
        warn!("EXTASK_BIND_ADDR not set, using {}", DEFAULT_BIND_ADDR);
        DEFAULT_BIND_ADDR.to_string()
    });

    let store = Arc::new(InMemoryTaskStore::new());
    let app = Router::new().nest("/engine-rest", rest::router(store));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(address = %listener.local_addr()?, "External task engine listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("External task engine stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
