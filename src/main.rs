//! Wallet Back-Office Service - Main Application Entry Point
//!
//! REST API for a fintech back office: tenant and user onboarding with KYC,
//! wallets backed by an append-only ledger, virtual accounts and payouts
//! through a banking partner, inbound processor webhooks and an admin console.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: API key with SHA-256 hashing, admin role for `/admin`
//! - **Banking partner**: JSON over HTTP with reqwest
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Initialize logging
//! 3. Create database connection pool and run migrations
//! 4. Create the bootstrap admin, if configured
//! 5. Start the payout reconciler
//! 6. Serve HTTP until Ctrl+C

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod partner;
mod routes;
mod services;
mod state;

use std::{sync::Arc, time::Duration};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    config::{Config, LogFormat},
    partner::{BankingPartner, HttpBankingPartner},
    services::{onboarding_service, payout_service},
    state::AppState,
};

fn init_tracing(format: LogFormat) {
    // RUST_LOG wins; defaults to info
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=info,sqlx=warn".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    if let Some(key) = &config.bootstrap_admin_key {
        if onboarding_service::bootstrap_admin(&pool, key, &config.default_currency).await? {
            tracing::info!("Bootstrap admin created");
        }
    }

    let partner: Arc<dyn BankingPartner> = Arc::new(HttpBankingPartner::new(
        config.partner_base_url.clone(),
        config.partner_api_key.clone(),
        Duration::from_secs(config.partner_timeout_secs),
    )?);

    if config.payout_reconcile_interval_secs > 0 {
        tokio::spawn(payout_service::run_reconciler(
            pool.clone(),
            partner.clone(),
            Duration::from_secs(config.payout_reconcile_interval_secs),
        ));
    } else {
        tracing::warn!("Payout reconciler disabled");
    }

    let addr = format!("0.0.0.0:{}", config.server_port);
    let state = AppState {
        pool,
        config: Arc::new(config),
        partner,
    };
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
