//! Measures tracker endpoint service.
//!
//! Serves the catalog and shared student state over `/exec`, with SQLite persistence.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use medidas_tracker::config::Config;
use medidas_tracker::db::{self, Repository};
use medidas_tracker::parser::parse_catalog_str;
use medidas_tracker::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting measures tracker endpoint");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if no key is configured
    if config.api_key.is_none() {
        tracing::warn!("No API key configured (MEDIDAS_API_KEY). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // Seed the catalog
    if let Some(path) = &config.catalog_path {
        tracing::info!("Loading catalog from {:?}", path);
        let text = tokio::fs::read_to_string(path).await?;
        let catalog = parse_catalog_str(&text)?;
        let revision_id = repo.replace_catalog(&catalog).await?;
        tracing::info!(revision_id, "Catalog loaded");
    }

    let state = AppState {
        repo,
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
