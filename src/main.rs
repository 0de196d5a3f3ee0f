// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fixie-Run API Server
//!
//! Records rides and runs, prices them in FIXIE and settles the rewards
//! through the FIXIE token contract.

use fixie_run::{
    config::Config,
    db::FirestoreDb,
    services::{ChainClient, ChainService},
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging
    init_logging()?;

    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        rewards = ?config.rewards,
        "Starting Fixie-Run API"
    );

    let db = FirestoreDb::new(&config.gcp_project_id).await?;

    let chain = match &config.chain {
        Some(chain_config) => {
            let service: ChainService<ChainClient> = ChainService::connect(chain_config)?;
            tracing::info!(
                rpc_url = %chain_config.rpc_url,
                token = %chain_config.token_address,
                nft = %chain_config.nft_address,
                "Blockchain settlement enabled"
            );
            Some(Arc::new(service))
        }
        None => {
            tracing::warn!("Blockchain settlement disabled; web3 routes will return 503");
            None
        }
    };

    let state = Arc::new(AppState::new(config.clone(), db, chain));
    spawn_cache_janitor(state.clone());

    let app = fixie_run::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically drop expired cache entries and idle rate-limit buckets.
fn spawn_cache_janitor(state: Arc<AppState>) {
    let period = Duration::from_secs(state.config.cache_ttl_secs.max(1) * 4);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let purged = state.balance_cache.purge_expired()
                + state.nft_cache.purge_expired()
                + state.leaderboard_cache.purge_expired()
                + state.used_nonces.purge_expired()
                + state.mints_in_flight.purge_expired()
                + state.rate_limiter.purge_idle();
            if purged > 0 {
                tracing::debug!(purged, "Purged expired cache entries");
            }
        }
    });
}

/// Initialize structured JSON logging.
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fixie_run=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
