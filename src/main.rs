//! DeepWiki - repository to wiki backend
//!
//! Fetches GitHub READMEs, indexes them and generates wiki pages in
//! background jobs, with status polling over a REST API.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use deepwiki::config::{Config, LogFormat, LoggingConfig};
use deepwiki::services::JobWorker;
use deepwiki::{api, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env();

    init_tracing(&config.logging);

    tracing::info!(
        "Starting DeepWiki server on {}:{}",
        config.server.host,
        config.server.port
    );

    let addr: SocketAddr = config
        .bind_addr()
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.bind_addr()))?;

    // Initialize application state
    let state = AppState::new(config.clone())
        .await
        .context("Failed to initialize application state")?;
    tracing::info!(database = %config.database.path, "Application state initialized");

    // Start background job worker
    let _job_worker_handle = if config.worker.enabled {
        let job_worker = JobWorker::new(state.task_context(), config.worker.clone());
        let handle = job_worker.start().await;
        tracing::info!(worker_id = %job_worker.worker_id(), "Background job worker started");
        Some(handle)
    } else {
        tracing::warn!("Job worker disabled, queued jobs will wait for an external worker");
        None
    };

    let app = api::app(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.filter)
        .unwrap_or_else(|_| EnvFilter::new("deepwiki=info,tower_http=info"));

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
