//! Network access for the offline layer.
//!
//! ### Requests
//! - [`FetchRequest`] carries method, URL, destination and headers. The
//!   destination (`document`, `script`, `image`, ...) tells the cache manager
//!   whether a request is a page navigation.
//!
//! ### Network
//! - [`Network`] is the seam the cache manager fetches through; tests swap in
//!   a scripted implementation.
//! - [`FetchClient`] is the reqwest implementation: rustls, compression,
//!   bounded redirects, timeout from configuration.
//! - Non-2xx statuses are responses, not errors. Only transport failures
//!   (connect, DNS, timeout, body read) are errors. Body size is not limited
//!   here; the cache decides what it is willing to store.

pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, StatusCode, Url, header};
use std::time::{Duration, Instant};

pub use self::url::{EXTENSION_SCHEMES, UrlError, is_extension_scheme, resolve};

use midrash_core::{AppConfig, CachedResponse, Error};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "midrash-offline/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "midrash-offline/0.1".to_string(),
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl FetchConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// What a request is for, as reported by `Sec-Fetch-Dest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// Top-level page navigation.
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    /// `fetch()`/XHR calls and anything unreported.
    #[default]
    Empty,
    Other,
}

impl Destination {
    pub fn from_fetch_dest(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" => Destination::Document,
            "script" => Destination::Script,
            "style" => Destination::Style,
            "image" => Destination::Image,
            "font" => Destination::Font,
            "manifest" => Destination::Manifest,
            "" | "empty" => Destination::Empty,
            _ => Destination::Other,
        }
    }
}

/// A request as seen by the cache manager.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
    pub headers: header::HeaderMap,
    /// Forwarded as-is; only non-GET requests carry one.
    pub body: Option<Bytes>,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, destination: Destination::Empty, headers: header::HeaderMap::new(), body: None }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// A GET page navigation.
    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_destination(Destination::Document)
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_headers(mut self, headers: header::HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.destination == Destination::Document
    }
}

/// Response from a fetch or a cache read.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The URL requested
    pub url: Url,
    /// The final URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Content-Type header
    pub content_type: Option<String>,
    /// Response body bytes
    pub bytes: Bytes,
    /// Response headers
    pub headers: header::HeaderMap,
    /// Time taken to fetch in milliseconds (0 for cache reads)
    pub fetch_ms: u64,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Snapshot for storage, keyed by the request that produced it.
    pub fn to_cached(&self, request: &FetchRequest) -> CachedResponse {
        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        CachedResponse {
            url: request.url.to_string(),
            method: request.method.as_str().to_string(),
            status: self.status.as_u16(),
            headers,
            body: self.bytes.to_vec(),
            cached_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Rebuild a response from a stored entry.
    pub fn from_cached(cached: &CachedResponse) -> Result<Self, Error> {
        let url = Url::parse(&cached.url).map_err(|e| Error::CorruptEntry(format!("{}: {e}", cached.url)))?;
        let status = StatusCode::from_u16(cached.status)
            .map_err(|e| Error::CorruptEntry(format!("status {}: {e}", cached.status)))?;

        let mut headers = header::HeaderMap::new();
        for (name, value) in &cached.headers {
            if let (Ok(name), Ok(value)) =
                (header::HeaderName::from_bytes(name.as_bytes()), header::HeaderValue::from_str(value))
            {
                headers.append(name, value);
            }
        }

        Ok(Self {
            final_url: url.clone(),
            url,
            status,
            content_type: cached.header("content-type").map(str::to_string),
            bytes: Bytes::from(cached.body.clone()),
            headers,
            fetch_ms: 0,
        })
    }
}

/// Anything the cache manager can fetch through.
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request. Non-2xx statuses are `Ok`; only transport
    /// failures are `Err`.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Error>;
}

/// HTTP fetch client backed by reqwest.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

pub(crate) fn transport_error(err: &reqwest::Error) -> Error {
    if err.is_timeout() { Error::FetchTimeout(err.to_string()) } else { Error::Network(err.to_string()) }
}

#[async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        let start = Instant::now();

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| transport_error(&e))?;

        let status = response.status();
        let final_url = response.url().clone();
        let headers = response.headers().clone();

        let bytes = response.bytes().await.map_err(|e| transport_error(&e))?;

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} {} -> {} ({}) in {}ms ({} bytes)",
            request.method,
            request.url,
            final_url,
            status.as_u16(),
            fetch_ms,
            bytes.len()
        );

        Ok(FetchResponse { url: request.url.clone(), final_url, status, content_type, bytes, headers, fetch_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "midrash-offline/0.1");
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { timeout_ms: 1_500, user_agent: "test/1".into(), ..Default::default() };
        let config = FetchConfig::from_app_config(&app);
        assert_eq!(config.timeout, Duration::from_millis(1_500));
        assert_eq!(config.user_agent, "test/1");
    }

    #[test]
    fn test_destination_parsing() {
        assert_eq!(Destination::from_fetch_dest("document"), Destination::Document);
        assert_eq!(Destination::from_fetch_dest("Image"), Destination::Image);
        assert_eq!(Destination::from_fetch_dest(""), Destination::Empty);
        assert_eq!(Destination::from_fetch_dest("audioworklet"), Destination::Other);
    }

    #[test]
    fn test_navigation_request() {
        let url = Url::parse("https://beit-midrash.example/schedule").unwrap();
        assert!(FetchRequest::navigate(url.clone()).is_navigation());
        assert!(!FetchRequest::get(url).is_navigation());
    }

    #[test]
    fn test_cached_round_trip_keeps_headers() {
        let url = Url::parse("https://beit-midrash.example/app.css").unwrap();
        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/css"));
        let response = FetchResponse {
            url: url.clone(),
            final_url: url.clone(),
            status: StatusCode::OK,
            content_type: Some("text/css".into()),
            bytes: Bytes::from_static(b"body{}"),
            headers,
            fetch_ms: 12,
        };

        let cached = response.to_cached(&FetchRequest::get(url));
        assert_eq!(cached.method, "GET");
        let restored = FetchResponse::from_cached(&cached).unwrap();
        assert_eq!(restored.status, StatusCode::OK);
        assert_eq!(restored.content_type.as_deref(), Some("text/css"));
        assert_eq!(restored.bytes, Bytes::from_static(b"body{}"));
        assert_eq!(restored.fetch_ms, 0);
    }

    #[test]
    fn test_from_cached_rejects_bad_status() {
        let cached = CachedResponse {
            url: "https://beit-midrash.example/".into(),
            method: "GET".into(),
            status: 1000,
            headers: Vec::new(),
            body: Vec::new(),
            cached_at: String::new(),
        };
        assert!(matches!(FetchResponse::from_cached(&cached), Err(Error::CorruptEntry(_))));
    }

    #[tokio::test]
    async fn test_fetch_client_new() {
        let client = FetchClient::new(FetchConfig::default());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_large_body_is_returned() {
        use axum::{Router, routing::get};

        const SIZE: usize = 6 * 1024 * 1024;
        let app = Router::new().route("/video/shiur.webm", get(|| async { vec![7u8; SIZE] }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let url = Url::parse(&format!("http://{addr}/video/shiur.webm")).unwrap();
        let response = client.fetch(&FetchRequest::get(url)).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.bytes.len(), SIZE);
    }
}
