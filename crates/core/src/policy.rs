//! Cacheability gate consulted before every cache write.

use url::{Origin, Url};

/// Decides whether a response for a URL may be written to any cache.
///
/// A URL is cacheable when it is same-origin with the site or served by a
/// trusted asset host, and contains none of the deny markers. The gate is
/// independent of strategy classification.
#[derive(Debug, Clone)]
pub struct CacheabilityPolicy {
    origin: Origin,
    trusted_hosts: Vec<String>,
    deny_markers: Vec<String>,
}

impl CacheabilityPolicy {
    pub fn new(site: &Url, trusted_hosts: &[String], deny_markers: &[String]) -> Self {
        Self {
            origin: site.origin(),
            trusted_hosts: trusted_hosts.iter().map(|h| h.trim().to_lowercase()).filter(|h| !h.is_empty()).collect(),
            deny_markers: deny_markers.iter().filter(|m| !m.is_empty()).cloned().collect(),
        }
    }

    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin
    }

    /// Exact host match, or a subdomain of a trusted host.
    pub fn is_trusted_host(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        self.trusted_hosts
            .iter()
            .any(|trusted| host == *trusted || host.ends_with(&format!(".{trusted}")))
    }

    pub fn is_denied(&self, url: &Url) -> bool {
        let s = url.as_str();
        self.deny_markers.iter().any(|marker| s.contains(marker.as_str()))
    }

    pub fn is_cacheable(&self, url: &Url) -> bool {
        (self.is_same_origin(url) || self.is_trusted_host(url)) && !self.is_denied(url)
    }
}
