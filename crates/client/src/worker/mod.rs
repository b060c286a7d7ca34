//! The offline cache manager.
//!
//! ### Lifecycle
//! - [`CacheManager::on_install`] seeds `static-<v>` from the manifest, all or
//!   nothing, and leaves the worker waiting.
//! - [`CacheManager::on_activate`] deletes caches from older generations and
//!   claims open pages.
//!
//! ### Requests
//! - [`CacheManager::on_fetch`] classifies the URL through the route table
//!   and dispatches to one of the [`strategies`]. Non-GET and extension
//!   requests, and every request before activation, go straight to the
//!   network.
//!
//! ### Messages and events
//! - `SKIP_WAITING`, `CLEAR_CACHE` via [`CacheManager::on_message`].
//! - Background sync, push and notification clicks.

pub mod clients;
pub mod lifecycle;
pub mod messages;
pub mod push;
pub mod strategies;

use std::sync::Arc;

use futures_util::future::try_join_all;
use reqwest::{Method, Url};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use midrash_core::{
    AppConfig, CacheGeneration, CacheKind, CacheStore, CacheabilityPolicy, ConfigError, Error, RouteTable, Strategy,
};

pub use self::clients::{Clients, Page, PageRegistry, WindowAction};
pub use self::lifecycle::WorkerState;
pub use self::messages::{ClientMessage, WorkerMessage};
pub use self::push::{Notification, Notifier, PushPayload};
pub use self::strategies::{ResponseSource, Served, StrategyContext};

use crate::fetch::{FetchRequest, FetchResponse, Network, is_extension_scheme, resolve};

/// Everything the cache manager is configured with.
#[derive(Debug, Clone)]
pub struct CacheManagerConfig {
    pub generation: CacheGeneration,
    pub origin: Url,
    /// Absolute URLs seeded into the static cache at install.
    pub static_manifest: Vec<Url>,
    /// Cached document served to offline navigations.
    pub offline_shell: Url,
    pub routes: RouteTable,
    pub policy: CacheabilityPolicy,
    /// Largest response body written to a runtime cache.
    pub max_entry_bytes: usize,
    pub sync_tag: String,
    /// Shown when a push arrives without a usable payload.
    pub default_notification: Notification,
}

impl CacheManagerConfig {
    /// Build from the loaded application configuration, resolving every
    /// manifest path against the origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the origin, a manifest path or a pattern is
    /// invalid.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let static_manifest = config
            .static_manifest
            .iter()
            .map(|path| config.resolve(path))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            generation: config.cache_generation(),
            origin: config.origin_url()?,
            static_manifest,
            offline_shell: config.resolve(&config.offline_shell)?,
            routes: config.route_table()?,
            policy: config.cacheability_policy()?,
            max_entry_bytes: config.max_bytes,
            sync_tag: config.sync_tag.clone(),
            default_notification: Notification {
                title: config.notification_title.clone(),
                body: config.notification_body.clone(),
                link: Some("/".to_string()),
            },
        })
    }
}

/// Result of [`CacheManager::on_fetch`].
#[derive(Debug)]
pub struct FetchOutcome {
    pub response: FetchResponse,
    pub source: ResponseSource,
    /// `None` when the request bypassed the caches.
    pub strategy: Option<Strategy>,
    /// Cache write or revalidation still running for this request.
    pub background: Option<JoinHandle<()>>,
}

impl FetchOutcome {
    fn bypass(response: FetchResponse) -> Self {
        Self { response, source: ResponseSource::Network, strategy: None, background: None }
    }

    /// Wait for any background cache work to finish.
    pub async fn settle(&mut self) {
        if let Some(handle) = self.background.take()
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "background cache task failed");
        }
    }
}

/// One cache manager instance, bound to a single cache generation.
pub struct CacheManager {
    config: CacheManagerConfig,
    store: CacheStore,
    network: Arc<dyn Network>,
    clients: Arc<dyn Clients>,
    notifier: Arc<dyn Notifier>,
    policy: Arc<CacheabilityPolicy>,
    state: RwLock<WorkerState>,
}

impl CacheManager {
    pub fn new(
        config: CacheManagerConfig, store: CacheStore, network: Arc<dyn Network>, clients: Arc<dyn Clients>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let policy = Arc::new(config.policy.clone());
        Self { config, store, network, clients, notifier, policy, state: RwLock::new(WorkerState::Parsed) }
    }

    pub fn config(&self) -> &CacheManagerConfig {
        &self.config
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, state: WorkerState) {
        let mut current = self.state.write().await;
        let from = *current;
        tracing::debug!(%from, to = %state, generation = %self.config.generation, "worker state");
        *current = state;
    }

    /// Seed the static cache from the manifest.
    ///
    /// Every manifest entry is fetched before anything is written; a transport
    /// failure or non-2xx status aborts the install with nothing stored and
    /// the worker back in `Parsed`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InstallFailed` describing the first failing entry.
    pub async fn on_install(&self) -> Result<(), Error> {
        self.set_state(WorkerState::Installing).await;

        match self.seed_static_cache().await {
            Ok(count) => {
                tracing::info!(
                    generation = %self.config.generation,
                    entries = count,
                    "installed, waiting to activate"
                );
                self.set_state(WorkerState::Installed).await;
                Ok(())
            }
            Err(e) => {
                tracing::error!(generation = %self.config.generation, error = %e, "install failed");
                self.set_state(WorkerState::Parsed).await;
                Err(match e {
                    Error::InstallFailed(_) => e,
                    other => Error::InstallFailed(other.to_string()),
                })
            }
        }
    }

    async fn seed_static_cache(&self) -> Result<usize, Error> {
        let static_cache = self.config.generation.name(CacheKind::Static);
        self.store.open_cache(&static_cache).await?;

        let fetches = self.config.static_manifest.iter().map(|url| {
            let request = FetchRequest::get(url.clone());
            async move {
                let response = self.network.fetch(&request).await?;
                if !response.is_success() {
                    return Err(Error::InstallFailed(format!("{} returned {}", request.url, response.status)));
                }
                Ok(response.to_cached(&request))
            }
        });
        let entries = try_join_all(fetches).await?;

        self.store.put_entries(&static_cache, &entries).await?;
        Ok(entries.len())
    }

    /// Delete caches left by older generations and claim open pages.
    ///
    /// Returns the deleted cache names.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the cache list cannot be read or a delete
    /// fails; the worker stays `Installed`.
    pub async fn on_activate(&self) -> Result<Vec<String>, Error> {
        self.set_state(WorkerState::Activating).await;

        let deleted = match self.delete_stale_caches().await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::error!(generation = %self.config.generation, error = %e, "activation failed");
                self.set_state(WorkerState::Installed).await;
                return Err(e);
            }
        };

        let claimed = self.clients.claim().await;
        self.set_state(WorkerState::Activated).await;
        tracing::info!(
            generation = %self.config.generation,
            deleted = ?deleted,
            claimed,
            "activated"
        );
        Ok(deleted)
    }

    async fn delete_stale_caches(&self) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in self.store.cache_names().await? {
            if self.config.generation.is_stale(&name) && self.store.delete_cache(&name).await? {
                tracing::debug!(cache = %name, "deleted stale cache");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Serve one request.
    ///
    /// # Errors
    ///
    /// Returns the network error when the chosen strategy has no fallback for
    /// it.
    pub async fn on_fetch(&self, request: &FetchRequest) -> Result<FetchOutcome, Error> {
        if request.method != Method::GET || is_extension_scheme(&request.url) {
            tracing::trace!(method = %request.method, url = %request.url, "bypassing caches");
            return self.network.fetch(request).await.map(FetchOutcome::bypass);
        }

        let state = self.state().await;
        if !state.can_intercept_fetch() {
            tracing::trace!(url = %request.url, state = %state, "not activated, bypassing caches");
            return self.network.fetch(request).await.map(FetchOutcome::bypass);
        }

        let classification = self.config.routes.classify(&request.url);
        let ctx = self.strategy_context(classification.target);

        tracing::debug!(
            url = %request.url,
            strategy = %classification.strategy,
            cache = %ctx.target_cache,
            "dispatching fetch"
        );

        let served = match classification.strategy {
            Strategy::CacheFirst => strategies::cache_first(&ctx, request).await,
            Strategy::NetworkFirst => strategies::network_first(&ctx, request).await,
            Strategy::StaleWhileRevalidate => strategies::stale_while_revalidate(&ctx, request).await,
        }?;

        Ok(FetchOutcome {
            response: served.response,
            source: served.source,
            strategy: Some(classification.strategy),
            background: served.background,
        })
    }

    fn strategy_context(&self, target: CacheKind) -> StrategyContext {
        let target_cache = self.config.generation.name(target);
        let mut lookup_order = vec![target_cache.clone()];
        lookup_order.extend(self.config.generation.names().into_iter().filter(|name| *name != target_cache));

        StrategyContext {
            store: self.store.clone(),
            network: Arc::clone(&self.network),
            policy: Arc::clone(&self.policy),
            target_cache,
            lookup_order: lookup_order.into(),
            offline_shell: self.config.offline_shell.clone(),
            max_entry_bytes: self.config.max_entry_bytes,
        }
    }

    /// Handle a control message from a page.
    ///
    /// Returns the reply to broadcast, if any.
    ///
    /// # Errors
    ///
    /// Returns a storage error if clearing caches or activating fails.
    pub async fn on_message(&self, message: WorkerMessage) -> Result<Option<ClientMessage>, Error> {
        match message {
            WorkerMessage::SkipWaiting => {
                let state = self.state().await;
                if state.is_waiting() {
                    self.on_activate().await?;
                } else {
                    tracing::debug!(state = %state, "SKIP_WAITING ignored, worker not waiting");
                }
                Ok(None)
            }
            WorkerMessage::ClearCache => {
                let mut cleared = 0;
                for name in self.store.cache_names().await? {
                    if self.store.delete_cache(&name).await? {
                        cleared += 1;
                    }
                }
                let reply = ClientMessage::CacheCleared;
                let notified = self.clients.post_message(reply).await;
                tracing::info!(cleared, notified, "cleared all caches");
                Ok(Some(reply))
            }
        }
    }

    /// Background sync. Only the configured tag runs the sync hook, which
    /// currently has nothing to replay. Returns whether the hook ran.
    pub async fn on_sync(&self, tag: &str) -> bool {
        if tag != self.config.sync_tag {
            tracing::debug!(tag, "ignoring unknown sync tag");
            return false;
        }
        tracing::info!(tag, "background sync");
        true
    }

    /// Show the notification carried by a push, or the default one.
    pub async fn on_push(&self, data: Option<&[u8]>) -> Notification {
        let notification = match PushPayload::parse(data) {
            Some(payload) => payload.into_notification(&self.config.default_notification),
            None => self.config.default_notification.clone(),
        };
        self.notifier.show(&notification).await;
        notification
    }

    /// Focus a page already showing the notification's link, or open one.
    ///
    /// Links resolve against the origin; a missing or invalid link opens the
    /// site root.
    pub async fn on_notification_click(&self, link: Option<&str>) -> WindowAction {
        let target = link
            .and_then(|link| match resolve(&self.config.origin, link) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::debug!(link, error = %e, "unusable notification link, opening site root");
                    None
                }
            })
            .unwrap_or_else(|| self.config.origin.clone());

        let action = self.clients.focus_or_open(&target).await;
        tracing::debug!(url = %target, ?action, "notification click");
        action
    }
}
