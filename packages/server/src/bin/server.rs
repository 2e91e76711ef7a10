//! Mining-engine HTTP server entrypoint: loads config, migrates the
//! schema, wires `AppState`, and serves the axum router built in
//! `server_core::server::app`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use server_core::common::app_state::AppState;
use server_core::server::build_app;
use server_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,mining_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db_pool = PgPoolOptions::new()
        .max_connections(config.max_db_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    let store = mining_core::MiningStore::new(db_pool.clone());
    store.run_migrations().await.context("failed to run mining-engine migrations")?;

    // Site-specific extractors (httpBasicMiner, playwrightMiner, aiMiner, …)
    // are plugins external to this crate (spec §1); operators register
    // their concrete `Extractor` impls here before serving traffic.
    let extractors: HashMap<String, Arc<dyn mining_core::Extractor>> = HashMap::new();

    let state = AppState::new(db_pool, config.mining.clone(), extractors);
    let app = build_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "starting mining-engine server");

    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind listener")?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server error")?;

    Ok(())
}
