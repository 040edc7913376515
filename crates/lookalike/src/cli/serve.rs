//! The `lookalike serve` command: run the HTTP API.

use std::sync::Arc;

use clap::Args;
use lookalike_core::Config;
use tokio::net::TcpListener;

use crate::server::{create_app, AppState};

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address; overrides `server.addr`
    #[arg(long)]
    pub addr: Option<String>,
}

/// Execute the serve command.
///
/// The feature extractor must load before the listener binds; a missing or
/// broken model is fatal.
pub async fn execute(args: ServeArgs, config: Config) -> anyhow::Result<()> {
    let engine = super::load_engine(&config)?;
    let (store, blobs) = super::open_stores(&config).await?;

    let state = Arc::new(AppState::new(&config, engine, store, blobs));
    let app = create_app(state, config.server.max_body_mb);

    let addr = args.addr.unwrap_or_else(|| config.server.addr.clone());
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Cannot listen on {addr}: {e}"))?;

    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
