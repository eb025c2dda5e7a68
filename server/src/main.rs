mod chat;
mod config;
mod openai;
mod page;
mod provider;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::AppConfig;
use openai::OAIClient;
use provider::ChatProvider;

pub(crate) struct AppState {
    provider: Arc<dyn ChatProvider>,
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(page::index))
        .route(shared::CHAT_ROUTE, post(chat::generate))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    tracing::info!(model = %config.model, base_url = %config.base_url, "using completion provider");

    let app_state = Arc::new(AppState {
        provider: Arc::new(OAIClient::new(&config)),
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    tracing::info!("listening on {}", config.listen_addr);

    axum::serve(listener, router(app_state))
        .await
        .context("server error")?;

    Ok(())
}
