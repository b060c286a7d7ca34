//! URL resolution for cache keys and request routing.

use url::Url;

/// Schemes used by browser extensions; their requests bypass the caches.
pub const EXTENSION_SCHEMES: &[&str] = &[
    "chrome-extension",
    "moz-extension",
    "safari-extension",
    "safari-web-extension",
    "ms-browser-extension",
];

/// Error type for URL resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Whether the URL belongs to a browser extension.
pub fn is_extension_scheme(url: &Url) -> bool {
    EXTENSION_SCHEMES.contains(&url.scheme())
}

/// Resolve a site-relative or absolute URL string into a cache key URL.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Resolve against `base` (absolute inputs replace it)
/// 3. Lowercase the host
/// 4. Remove fragment (#...); caches never key on it
/// 5. Keep query string intact (do not reorder)
pub fn resolve(base: &Url, input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = base.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        if lowered != host {
            parsed
                .set_host(Some(&lowered))
                .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
        }
    }

    parsed.set_fragment(None);

    Ok(parsed)
}
