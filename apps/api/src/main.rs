use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use rehearse_api::archive::TranscriptArchive;
use rehearse_api::config::Config;
use rehearse_api::llm_client::{self, LlmClient};
use rehearse_api::routes::build_router;
use rehearse_api::state::AppState;
use rehearse_api::store::{RedisStore, SessionStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Rehearse API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize Redis-backed session store
    let redis = RedisStore::connect(&config.redis_url).await?;
    let store = SessionStore::new(Arc::new(redis));
    info!("Session store connected");

    // Initialize transcript archive (optional)
    let archive = match &config.archive {
        Some(archive_config) => {
            let archive = TranscriptArchive::connect(archive_config).await;
            info!("Transcript archive enabled (bucket: {})", archive.bucket());
            Some(archive)
        }
        None => {
            warn!("S3 not configured; evaluated transcripts will not be archived");
            None
        }
    };

    // Initialize LLM client
    let llm = LlmClient::new(config.openai_api_key.clone(), &config.openai_base_url);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let state = AppState::new(store, llm, archive);

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
