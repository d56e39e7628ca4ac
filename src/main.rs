mod action;
mod api;
mod assistant;
mod auth;
mod catalog;
mod config;
mod error;
mod formatter;
mod intent;
mod models;
mod query_builder;
mod ranker;
mod store;
mod text;

use std::sync::Arc;

use anyhow::{Context, Result};
use assistant::Assistant;
use axum::{
    routing::{get, post},
    Router,
};
use catalog::Catalog;
use config::Config;
use store::SqliteStore;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub assistant: Arc<Assistant>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "assistant_query_api=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.api_tokens_are_fallback {
        warn!("Serving with a generated bearer token for the local-dev user only");
    }

    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path)
            .with_context(|| format!("Failed loading catalog {}", path.display()))?,
        None => Catalog::builtin().context("Built-in catalog is invalid")?,
    };
    info!(menus = catalog.menus().len(), "Catalog loaded");

    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("Failed opening store {}", config.db_path.display()))?;
    if let Some(seed_path) = &config.seed_path {
        store.seed_from_file(seed_path).await?;
    }

    let assistant = Assistant::new(Arc::new(catalog), Arc::new(store))
        .with_max_candidates(config.max_candidates)
        .with_query_logging(config.log_queries);

    let state = AppState {
        config: config.clone(),
        assistant: Arc::new(assistant),
    };

    let app = Router::new()
        .route("/healthz", get(api::healthz))
        .route("/v1/assistant/answer", post(api::answer))
        .route("/v1/assistant/domains", get(api::list_domains))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("assistant-query-api listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
