//! `r2box-broker` binary: the loopback service process the Supervisor
//! spawns. Prints exactly one `LISTENING PORT=<n>` line to stdout once
//! bound, per the Supervisor's stdout contract.

use std::sync::Arc;

use anyhow::{Context, Result};
use r2box_broker::state::AppState;
use r2box_cache::FolderCache;
use r2box_core::config::Config;
use r2box_core::ports::object_store::ObjectStoreProvider;
use r2box_provider::client::R2Client;
use r2box_transfer::TransferEngine;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var_os("R2BOX_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path).with_env_overrides();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let credential_store = r2box_credentials::CredentialStore::detect(
        config.credentials.store_path.clone(),
        config.credentials.prefer_keychain,
    );
    let credentials = credential_store
        .load()
        .context("failed to load stored credentials")?
        .context("no credentials configured; run `r2box creds save` first")?;

    let provider: Arc<dyn ObjectStoreProvider> = Arc::new(R2Client::with_deadline(
        &credentials,
        std::time::Duration::from_secs(config.transfer.request_deadline_secs),
    ));
    let cache = Arc::new(FolderCache::with_ttl(
        config.cache.capacity,
        chrono::Duration::seconds(config.cache.ttl_secs),
        chrono::Duration::seconds(config.cache.staleness_secs),
    ));
    let transfer = Arc::new(TransferEngine::new(
        Arc::clone(&provider),
        Arc::clone(&cache),
        config.transfer.clone(),
    ));

    let state = Arc::new(AppState::new(provider, cache, transfer));
    let shutdown = state.shutdown.clone();

    let app = r2box_broker::build_router(Arc::clone(&state), &config.broker.cors_allowed_origins);

    let bind_addr = format!("{}:{}", config.broker.bind_address, config.broker.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    let actual_port = listener.local_addr()?.port();

    // Exactly one line matching `^LISTENING PORT=(\d+)$`; everything the
    // Supervisor reads afterwards is ordinary log output.
    println!("LISTENING PORT={actual_port}");

    let drain_secs = config.broker.shutdown_drain_secs;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            tracing::info!(drain_secs, "shutdown requested, draining in-flight requests");
        })
        .await
        .context("broker server error")?;

    Ok(())
}
