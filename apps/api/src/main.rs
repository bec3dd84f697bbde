mod config;
mod cv;
mod email;
mod errors;
mod llm_client;
mod routes;
mod share;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::share::receivers::ReceiverHub;
use crate::share::redis_store::RedisShareStore;
use crate::share::store::{sweep_best_effort, MemoryShareStore, PendingShareStore};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting jobmail v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the pending-share store
    let store = build_store(&config)?;

    // Expired shares from a previous run are cleared before serving.
    let swept = sweep_best_effort(store.as_ref(), config.pending_share_ttl).await;
    info!(swept, "Startup sweep finished");
    spawn_sweeper(store.clone(), &config);

    // Initialize LLM client
    let llm = LlmClient::new(config.llm_api_url.clone(), config.groq_api_key.clone())?;
    info!(
        "LLM client initialized (default model: {}, server key: {})",
        config.default_model,
        llm.has_api_key()
    );

    // Build app state
    let state = AppState {
        store,
        receivers: ReceiverHub::new(),
        llm,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Redis when REDIS_URL is set, process memory otherwise.
fn build_store(config: &Config) -> Result<Arc<dyn PendingShareStore>> {
    match &config.redis_url {
        Some(url) => {
            let store =
                RedisShareStore::new(url, &config.redis_key_prefix, config.pending_share_ttl)?;
            info!("Pending shares stored in Redis");
            Ok(Arc::new(store))
        }
        None => {
            info!("Pending shares stored in memory");
            Ok(Arc::new(MemoryShareStore::new()))
        }
    }
}

fn spawn_sweeper(store: Arc<dyn PendingShareStore>, config: &Config) {
    let max_age = config.pending_share_ttl;
    let mut interval = tokio::time::interval(config.sweep_interval);
    tokio::spawn(async move {
        // The first tick fires immediately and the startup sweep already ran.
        interval.tick().await;
        loop {
            interval.tick().await;
            sweep_best_effort(store.as_ref(), max_age).await;
        }
    });
}
