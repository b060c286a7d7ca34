//! midrash-offline entry point.
//!
//! Boots one cache manager in front of the configured site origin and serves
//! it as a local HTTP proxy. Logging goes to stderr as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use midrash_client::ContentClient;
use midrash_client::fetch::{FetchClient, FetchConfig};
use midrash_client::worker::{CacheManager, CacheManagerConfig, PageRegistry};
use midrash_core::{AppConfig, CacheStore};

mod error;
mod handler;
mod notify;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        origin = %config.origin,
        generation = %config.generation,
        db = %config.db_path.display(),
        "starting midrash-offline"
    );

    let store = CacheStore::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache database {}", config.db_path.display()))?;
    let network = Arc::new(FetchClient::new(FetchConfig::from_app_config(&config))?);
    let pages = Arc::new(PageRegistry::new());

    let manager = Arc::new(CacheManager::new(
        CacheManagerConfig::from_app_config(&config)?,
        store.clone(),
        network,
        pages.clone(),
        Arc::new(notify::LogNotifier),
    ));

    // A fresh process has no controlling worker, so a successful install
    // activates straight away.
    match manager.on_install().await {
        Ok(()) => {
            manager.on_activate().await?;
        }
        Err(e) => tracing::warn!(error = %e, "install failed, proxying without caches"),
    }

    let mut events = pages.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok((page, message)) => tracing::info!(page, ?message, "message to page"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "page message relay lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let state = handler::AppState {
        manager,
        content: Arc::new(ContentClient::from_app_config(&config, store)?),
        origin: config.origin_url()?,
        max_body: config.max_bytes,
    };

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, handler::router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("shut down");
    Ok(())
}
