//! Strategy classification by URL pattern.
//!
//! A [`RouteTable`] is an ordered list of `(pattern, strategy, target)`
//! routes. The first route whose pattern matches decides the strategy; a URL
//! that matches nothing is served stale-while-revalidate. The target cache is
//! decided separately: any URL matched by an image route goes to the image
//! cache, whichever route picked its strategy.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::generation::CacheKind;

/// Script, style, font and icon files.
pub const DEFAULT_STATIC_PATTERNS: &[&str] = &[r"(?i)\.(?:js|mjs|css|woff2?|ttf|otf|eot|ico)(?:\?.*)?$"];

/// API calls and identity/auth/token endpoints.
pub const DEFAULT_NETWORK_FIRST_PATTERNS: &[&str] = &[
    r"/api/",
    r"/\.netlify/functions/",
    r"/\.netlify/identity",
    r"(?i)/(?:auth|login|logout)(?:[/?]|$)",
    r"(?i)token",
];

/// Image files.
pub const DEFAULT_IMAGE_PATTERNS: &[&str] = &[r"(?i)\.(?:png|jpe?g|gif|webp|avif|svg)(?:\?.*)?$"];

/// How a request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Serve from cache; only go to the network on a miss.
    CacheFirst,
    /// Prefer the network; fall back to cache, then to the offline shell.
    NetworkFirst,
    /// Serve from cache immediately and refresh it in the background.
    StaleWhileRevalidate,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::CacheFirst => f.write_str("cache-first"),
            Strategy::NetworkFirst => f.write_str("network-first"),
            Strategy::StaleWhileRevalidate => f.write_str("stale-while-revalidate"),
        }
    }
}

/// One entry of the route table.
#[derive(Debug, Clone)]
pub struct Route {
    pub pattern: Regex,
    pub strategy: Strategy,
    pub target: CacheKind,
}

impl Route {
    pub fn new(pattern: &str, strategy: Strategy, target: CacheKind) -> Result<Self, regex::Error> {
        Ok(Self { pattern: Regex::new(pattern)?, strategy, target })
    }

    pub fn matches(&self, url: &Url) -> bool {
        self.pattern.is_match(url.as_str())
    }
}

/// Result of classifying one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub strategy: Strategy,
    pub target: CacheKind,
}

/// Ordered route list, first match wins.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Build the three standard groups from pattern lists, in group order:
    /// static (cache-first into the dynamic cache), network-first, images
    /// (cache-first into the image cache).
    pub fn from_patterns<S: AsRef<str>>(
        static_patterns: &[S], network_first_patterns: &[S], image_patterns: &[S],
    ) -> Result<Self, regex::Error> {
        let groups = [
            (static_patterns, Strategy::CacheFirst, CacheKind::Dynamic),
            (network_first_patterns, Strategy::NetworkFirst, CacheKind::Dynamic),
            (image_patterns, Strategy::CacheFirst, CacheKind::Images),
        ];

        let mut routes = Vec::new();
        for (patterns, strategy, target) in groups {
            for pattern in patterns {
                routes.push(Route::new(pattern.as_ref(), strategy, target)?);
            }
        }
        Ok(Self { routes })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn classify(&self, url: &Url) -> Classification {
        let strategy = self
            .routes
            .iter()
            .find(|route| route.matches(url))
            .map_or(Strategy::StaleWhileRevalidate, |route| route.strategy);

        let is_image = self
            .routes
            .iter()
            .any(|route| route.target == CacheKind::Images && route.matches(url));

        Classification { strategy, target: if is_image { CacheKind::Images } else { CacheKind::Dynamic } }
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        // The built-in patterns are literals covered by tests.
        Self::from_patterns(DEFAULT_STATIC_PATTERNS, DEFAULT_NETWORK_FIRST_PATTERNS, DEFAULT_IMAGE_PATTERNS)
            .unwrap_or_else(|_| Self::new(Vec::new()))
    }
}
