//! DeDust Swap Backend
//!
//! HTTP API server that resolves DeDust pools and vaults over toncenter and
//! returns unsigned swap messages for wallets to sign.

use anyhow::Context;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dedust_swap::api;
use dedust_swap::config::Config;
use dedust_swap::dex::SwapPlanner;
use dedust_swap::node::ToncenterClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("Router: {}", config.dex.router);
    tracing::info!("Node endpoint: {}", config.toncenter_url);
    if config.toncenter_api_key.is_none() {
        tracing::warn!("TONCENTER_API_KEY not set, requests will be rate limited");
    }
    tracing::info!(
        "Fees: {} TON per message, {} TON forwarded; pool type {:?}, min output {}",
        config.dex.fee.tx_amount.to_ton_string(),
        config.dex.fee.forward_amount.to_ton_string(),
        config.dex.policy.pool_type,
        config.dex.policy.min_output
    );

    let node = Arc::new(ToncenterClient::new(
        config.toncenter_url.clone(),
        config.toncenter_api_key.clone(),
    ));
    let planner = SwapPlanner::new(node, config.dex.clone());

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api::router(planner))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server
    let addr = config.listen_addr;
    tracing::info!("Starting server on {}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  GET  /health          - Health check");
    tracing::info!("  GET  /api/pool        - Resolve pool (?from=&to=)");
    tracing::info!("  GET  /api/vault       - Resolve vault (?asset=)");
    tracing::info!("  POST /api/swap/plan   - Build unsigned swap message");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}
