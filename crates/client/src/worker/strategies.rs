//! The three serving strategies.
//!
//! Each strategy is a plain async function over a request and a
//! [`StrategyContext`], so it can be driven with a scripted [`Network`] and an
//! in-memory store. Cache writes never fail a response: a failed write is
//! logged and dropped.

use std::sync::Arc;

use reqwest::{Method, StatusCode, Url, header};
use tokio::task::JoinHandle;

use midrash_core::{CacheStore, CacheabilityPolicy, Error};

use crate::fetch::{FetchRequest, FetchResponse, Network};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// The seeded shell document, served to an offline navigation.
    OfflineShell,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Cache => "cache",
            ResponseSource::Network => "network",
            ResponseSource::OfflineShell => "offline-shell",
        }
    }
}

/// A response plus any cache work still running for it.
#[derive(Debug)]
pub struct Served {
    pub response: FetchResponse,
    pub source: ResponseSource,
    pub background: Option<JoinHandle<()>>,
}

impl Served {
    fn new(response: FetchResponse, source: ResponseSource) -> Self {
        Self { response, source, background: None }
    }

    fn with_background(mut self, handle: Option<JoinHandle<()>>) -> Self {
        self.background = handle;
        self
    }
}

/// Everything a strategy needs, cheap to clone into background tasks.
#[derive(Clone)]
pub struct StrategyContext {
    pub store: CacheStore,
    pub network: Arc<dyn Network>,
    pub policy: Arc<CacheabilityPolicy>,
    /// Cache written by this request.
    pub target_cache: String,
    /// Caches read by this request, target first.
    pub lookup_order: Arc<[String]>,
    pub offline_shell: Url,
    /// Largest body written to a cache; bigger responses are served but not
    /// stored.
    pub max_entry_bytes: usize,
}

impl StrategyContext {
    /// Cached response for `url`, searched in lookup order.
    ///
    /// A read failure is treated as a miss so the request can still reach the
    /// network.
    async fn lookup(&self, url: &Url) -> Option<FetchResponse> {
        match self.store.match_first(&self.lookup_order, Method::GET.as_str(), url.as_str()).await {
            Ok(Some((cache, entry))) => match FetchResponse::from_cached(&entry) {
                Ok(response) => {
                    tracing::trace!(%url, cache = %cache, "cache hit");
                    Some(response)
                }
                Err(e) => {
                    tracing::warn!(%url, cache = %cache, error = %e, "discarding unreadable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(%url, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Whether a response may be written: a full 2xx answer to a plain GET
    /// for a cacheable URL, within the entry size limit.
    ///
    /// Entries are keyed by method and URL only, so partial content and
    /// anything answering a `Range` request is never stored.
    fn is_storable(&self, request: &FetchRequest, response: &FetchResponse) -> bool {
        if request.method != Method::GET
            || !response.is_success()
            || response.status == StatusCode::PARTIAL_CONTENT
            || request.headers.contains_key(header::RANGE)
        {
            return false;
        }
        if response.bytes.len() > self.max_entry_bytes {
            tracing::debug!(
                url = %request.url,
                bytes = response.bytes.len(),
                limit = self.max_entry_bytes,
                "response too large to cache"
            );
            return false;
        }
        self.policy.is_cacheable(&request.url)
    }

    /// Write a copy into the target cache. Never fails; returns whether the
    /// entry was stored.
    async fn store(&self, request: &FetchRequest, response: &FetchResponse) -> bool {
        if !self.is_storable(request, response) {
            return false;
        }
        match self.store.put_entry(&self.target_cache, &response.to_cached(request)).await {
            Ok(()) => {
                tracing::trace!(url = %request.url, cache = %self.target_cache, "stored response");
                true
            }
            Err(e) => {
                tracing::warn!(
                    url = %request.url,
                    cache = %self.target_cache,
                    error = %e,
                    "cache write failed, response still served"
                );
                false
            }
        }
    }

    /// Store a copy on a background task. `None` when nothing will be stored.
    fn store_in_background(&self, request: &FetchRequest, response: &FetchResponse) -> Option<JoinHandle<()>> {
        if !self.is_storable(request, response) {
            return None;
        }
        let ctx = self.clone();
        let request = request.clone();
        let response = response.clone();
        Some(tokio::spawn(async move {
            ctx.store(&request, &response).await;
        }))
    }

    /// Fetch again and replace the cached entry on success.
    fn revalidate_in_background(&self, request: &FetchRequest) -> JoinHandle<()> {
        let ctx = self.clone();
        let request = request.clone();
        tokio::spawn(async move {
            match ctx.network.fetch(&request).await {
                Ok(response) => {
                    ctx.store(&request, &response).await;
                }
                Err(e) => tracing::debug!(url = %request.url, error = %e, "revalidation fetch failed"),
            }
        })
    }

    async fn offline_shell_for(&self, request: &FetchRequest) -> Option<FetchResponse> {
        if !request.is_navigation() {
            return None;
        }
        let shell = self.lookup(&self.offline_shell).await?;
        tracing::info!(url = %request.url, shell = %self.offline_shell, "serving offline shell");
        Some(shell)
    }
}

/// Serve from cache; on a miss fetch, store (before returning), and return.
///
/// # Errors
///
/// Returns the network error when there is no cached entry and the fetch fails.
pub async fn cache_first(ctx: &StrategyContext, request: &FetchRequest) -> Result<Served, Error> {
    if let Some(cached) = ctx.lookup(&request.url).await {
        return Ok(Served::new(cached, ResponseSource::Cache));
    }

    let response = ctx.network.fetch(request).await?;
    ctx.store(request, &response).await;
    Ok(Served::new(response, ResponseSource::Network))
}

/// Prefer the network; on a transport failure fall back to the cached entry,
/// then (for navigations) the offline shell.
///
/// # Errors
///
/// Returns the fetch error when it is not a transport failure or neither
/// fallback has an entry.
pub async fn network_first(ctx: &StrategyContext, request: &FetchRequest) -> Result<Served, Error> {
    match ctx.network.fetch(request).await {
        Ok(response) => {
            let background = ctx.store_in_background(request, &response);
            Ok(Served::new(response, ResponseSource::Network).with_background(background))
        }
        Err(err) if !err.is_network() => Err(err),
        Err(err) => {
            tracing::debug!(url = %request.url, error = %err, "network-first fetch failed, trying cache");
            if let Some(cached) = ctx.lookup(&request.url).await {
                return Ok(Served::new(cached, ResponseSource::Cache));
            }
            if let Some(shell) = ctx.offline_shell_for(request).await {
                return Ok(Served::new(shell, ResponseSource::OfflineShell));
            }
            Err(err)
        }
    }
}

/// Serve the cached entry immediately and refresh it in the background; with
/// no cached entry, wait on the network.
///
/// # Errors
///
/// Returns the network error when there is no cached entry and the fetch
/// fails (navigations still get the offline shell if seeded).
pub async fn stale_while_revalidate(ctx: &StrategyContext, request: &FetchRequest) -> Result<Served, Error> {
    if let Some(cached) = ctx.lookup(&request.url).await {
        let handle = ctx.revalidate_in_background(request);
        return Ok(Served::new(cached, ResponseSource::Cache).with_background(Some(handle)));
    }

    match ctx.network.fetch(request).await {
        Ok(response) => {
            let background = ctx.store_in_background(request, &response);
            Ok(Served::new(response, ResponseSource::Network).with_background(background))
        }
        Err(err) if !err.is_network() => Err(err),
        Err(err) => match ctx.offline_shell_for(request).await {
            Some(shell) => Ok(Served::new(shell, ResponseSource::OfflineShell)),
            None => Err(err),
        },
    }
}
