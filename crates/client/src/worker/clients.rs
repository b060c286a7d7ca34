//! Open pages the worker can claim, message and focus.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use url::Url;

use super::messages::ClientMessage;

/// Result of a notification click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAction {
    /// An open page already showed the target and was focused.
    Focused(u64),
    /// No page matched; a new one was opened.
    Opened(u64),
}

/// The pages (windows, tabs) a worker serves.
#[async_trait]
pub trait Clients: Send + Sync {
    /// Take control of every open page. Returns how many are now controlled.
    async fn claim(&self) -> usize;

    /// Post a message to every controlled page. Returns how many received it.
    async fn post_message(&self, message: ClientMessage) -> usize;

    /// Focus a page showing `url`, or open a new one.
    async fn focus_or_open(&self, url: &Url) -> WindowAction;
}

/// One open page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: u64,
    pub url: Url,
    pub controlled: bool,
    pub focused: bool,
}

/// In-process page registry.
///
/// Messages are fanned out on a broadcast channel tagged with the page id;
/// hosts subscribe to relay them to real pages.
pub struct PageRegistry {
    pages: RwLock<Vec<Page>>,
    next_id: AtomicU64,
    events: broadcast::Sender<(u64, ClientMessage)>,
}

impl PageRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self { pages: RwLock::new(Vec::new()), next_id: AtomicU64::new(1), events }
    }

    /// Register a page. New pages are uncontrolled until claimed.
    pub async fn open(&self, url: Url) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pages.write().await.push(Page { id, url, controlled: false, focused: false });
        id
    }

    pub async fn close(&self, id: u64) -> bool {
        let mut pages = self.pages.write().await;
        let before = pages.len();
        pages.retain(|page| page.id != id);
        pages.len() != before
    }

    pub async fn pages(&self) -> Vec<Page> {
        self.pages.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(u64, ClientMessage)> {
        self.events.subscribe()
    }
}

impl Default for PageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clients for PageRegistry {
    async fn claim(&self) -> usize {
        let mut pages = self.pages.write().await;
        for page in pages.iter_mut() {
            page.controlled = true;
        }
        pages.len()
    }

    async fn post_message(&self, message: ClientMessage) -> usize {
        let pages = self.pages.read().await;
        let mut delivered = 0;
        for page in pages.iter().filter(|page| page.controlled) {
            // No subscribers is not an error; the registry still counts the page.
            let _ = self.events.send((page.id, message));
            delivered += 1;
        }
        delivered
    }

    async fn focus_or_open(&self, url: &Url) -> WindowAction {
        let mut pages = self.pages.write().await;
        for page in pages.iter_mut() {
            page.focused = false;
        }

        if let Some(page) = pages.iter_mut().find(|page| page.url == *url) {
            page.focused = true;
            return WindowAction::Focused(page.id);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        pages.push(Page { id, url: url.clone(), controlled: true, focused: true });
        WindowAction::Opened(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse("https://beit-midrash.example").unwrap().join(path).unwrap()
    }

    #[tokio::test]
    async fn test_claim_controls_all_pages() {
        let registry = PageRegistry::new();
        registry.open(url("/")).await;
        registry.open(url("/gallery")).await;

        assert_eq!(registry.claim().await, 2);
        assert!(registry.pages().await.iter().all(|page| page.controlled));
    }

    #[tokio::test]
    async fn test_post_message_reaches_controlled_pages_only() {
        let registry = PageRegistry::new();
        let mut rx = registry.subscribe();
        let id = registry.open(url("/")).await;
        registry.claim().await;
        registry.open(url("/late")).await;

        assert_eq!(registry.post_message(ClientMessage::CacheCleared).await, 1);
        assert_eq!(rx.recv().await.unwrap(), (id, ClientMessage::CacheCleared));
    }

    #[tokio::test]
    async fn test_focus_existing_or_open_new() {
        let registry = PageRegistry::new();
        let id = registry.open(url("/events")).await;

        assert_eq!(registry.focus_or_open(&url("/events")).await, WindowAction::Focused(id));
        let opened = registry.focus_or_open(&url("/announcements")).await;
        assert!(matches!(opened, WindowAction::Opened(new_id) if new_id != id));
        assert_eq!(registry.pages().await.len(), 2);
    }

    #[tokio::test]
    async fn test_close() {
        let registry = PageRegistry::new();
        let id = registry.open(url("/")).await;
        assert!(registry.close(id).await);
        assert!(!registry.close(id).await);
    }
}
