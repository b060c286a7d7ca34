//! Client for the content store endpoints.
//!
//! Every public page and admin screen reads and writes its content through a
//! named endpoint. Reads are unauthenticated and fall back to the local
//! mirror, then to the endpoint's default document, when the network is
//! down. Writes need a bearer token and overwrite the whole document.

use std::fmt;

use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use midrash_core::{AppConfig, CacheStore, Error};

use crate::fetch::{FetchConfig, transport_error};

/// The content store's named endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentEndpoint {
    PrayerTimes,
    Gallery,
    Announcements,
    Events,
    SiteContent,
    SiteSettings,
    Footer,
    Popups,
    ContactPage,
}

impl ContentEndpoint {
    pub const ALL: [ContentEndpoint; 9] = [
        ContentEndpoint::PrayerTimes,
        ContentEndpoint::Gallery,
        ContentEndpoint::Announcements,
        ContentEndpoint::Events,
        ContentEndpoint::SiteContent,
        ContentEndpoint::SiteSettings,
        ContentEndpoint::Footer,
        ContentEndpoint::Popups,
        ContentEndpoint::ContactPage,
    ];

    /// Path segment under the content API base.
    pub fn slug(self) -> &'static str {
        match self {
            ContentEndpoint::PrayerTimes => "prayer-times",
            ContentEndpoint::Gallery => "gallery",
            ContentEndpoint::Announcements => "announcements",
            ContentEndpoint::Events => "events",
            ContentEndpoint::SiteContent => "site-content",
            ContentEndpoint::SiteSettings => "site-settings",
            ContentEndpoint::Footer => "footer",
            ContentEndpoint::Popups => "popups",
            ContentEndpoint::ContactPage => "contact-page",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|endpoint| endpoint.slug() == slug)
    }

    /// Document served when the store holds nothing for this endpoint.
    pub fn default_document(self) -> Value {
        match self {
            ContentEndpoint::PrayerTimes => json!({ "weekday": [], "shabbat": [], "notes": "" }),
            ContentEndpoint::Gallery => json!({ "images": [] }),
            ContentEndpoint::Announcements => json!({ "items": [] }),
            ContentEndpoint::Events => json!({ "items": [] }),
            ContentEndpoint::SiteContent => json!({ "hero": { "title": "", "subtitle": "" }, "about": "" }),
            ContentEndpoint::SiteSettings => json!({ "siteName": "בית המדרש", "notificationsEnabled": false }),
            ContentEndpoint::Footer => json!({ "address": "", "phone": "", "email": "", "links": [] }),
            ContentEndpoint::Popups => json!({ "popups": [] }),
            ContentEndpoint::ContactPage => json!({ "title": "", "details": [], "mapUrl": "" }),
        }
    }
}

impl fmt::Display for ContentEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Admin session token. Never printed.
#[derive(Clone)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// Where a content document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    Live,
    /// Last mirrored copy; the network was unavailable.
    Mirror,
    /// Built-in default; neither the network nor the mirror had it.
    Default,
}

impl ContentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentSource::Live => "live",
            ContentSource::Mirror => "mirror",
            ContentSource::Default => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentDocument {
    pub endpoint: ContentEndpoint,
    pub document: Value,
    pub source: ContentSource,
}

/// HTTP client for the content endpoints, mirroring every successful read.
pub struct ContentClient {
    http: Client,
    api_base: Url,
    store: CacheStore,
}

impl ContentClient {
    /// `api_base` is the directory URL the endpoint slugs are joined onto.
    ///
    /// # Errors
    ///
    /// Returns `Error::Network` if the HTTP client cannot be built.
    pub fn new(api_base: Url, fetch: &FetchConfig, store: CacheStore) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&fetch.user_agent)
            .timeout(fetch.timeout)
            .use_rustls_tls()
            .gzip(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        let api_base = if api_base.path().ends_with('/') {
            api_base
        } else {
            let mut base = api_base;
            let path = format!("{}/", base.path());
            base.set_path(&path);
            base
        };

        Ok(Self { http, api_base, store })
    }

    /// Client for `<origin><content_api_base>/`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if the origin or API base do not form a URL.
    pub fn from_app_config(config: &AppConfig, store: CacheStore) -> Result<Self, Error> {
        let api_base = config
            .resolve(&format!("{}/", config.content_api_base.trim_end_matches('/')))
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Self::new(api_base, &FetchConfig::from_app_config(config), store)
    }

    /// Full URL of an endpoint.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if the slug cannot be joined onto the base.
    pub fn endpoint_url(&self, endpoint: ContentEndpoint) -> Result<Url, Error> {
        self.api_base.join(endpoint.slug()).map_err(|e| Error::InvalidUrl(e.to_string()))
    }

    /// Read an endpoint's document.
    ///
    /// Never fails: a failed read degrades to the mirror, then to the
    /// endpoint's default document.
    pub async fn fetch(&self, endpoint: ContentEndpoint) -> ContentDocument {
        match self.fetch_live(endpoint).await {
            Ok(document) => {
                if let Err(e) = self.store.put_document(endpoint.slug(), &document).await {
                    tracing::warn!(%endpoint, error = %e, "failed to mirror content document");
                }
                return ContentDocument { endpoint, document, source: ContentSource::Live };
            }
            Err(e) => tracing::warn!(%endpoint, error = %e, "content fetch failed, using local copy"),
        }

        match self.store.get_document(endpoint.slug()).await {
            Ok(Some(mirrored)) => {
                tracing::debug!(%endpoint, fetched_at = %mirrored.fetched_at, "serving mirrored content");
                return ContentDocument { endpoint, document: mirrored.document, source: ContentSource::Mirror };
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(%endpoint, error = %e, "content mirror read failed"),
        }

        ContentDocument { endpoint, document: endpoint.default_document(), source: ContentSource::Default }
    }

    async fn fetch_live(&self, endpoint: ContentEndpoint) -> Result<Value, Error> {
        let url = self.endpoint_url(endpoint)?;
        let response = self.http.get(url).send().await.map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Error::HttpError(format!("{endpoint}: invalid JSON: {e}")))
    }

    /// Overwrite an endpoint's document.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` without a token, or on 401/403
    /// - `UpstreamConfig` on 503
    /// - `InvalidInput` on 400/422
    /// - `HttpError` on any other non-2xx
    /// - `Network`/`FetchTimeout` on transport failure
    pub async fn save(
        &self, endpoint: ContentEndpoint, document: &Value, token: Option<&BearerToken>,
    ) -> Result<(), Error> {
        let Some(token) = token else {
            return Err(Error::Unauthorized("missing bearer token".into()));
        };

        let url = self.endpoint_url(endpoint)?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token.as_str())
            .json(document)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = status_error(status, &body);
            tracing::warn!(%endpoint, status = status.as_u16(), error = %err, "content save rejected");
            return Err(err);
        }

        if let Err(e) = self.store.put_document(endpoint.slug(), document).await {
            tracing::warn!(%endpoint, error = %e, "failed to mirror saved document");
        }
        tracing::info!(%endpoint, "content saved");
        Ok(())
    }
}

/// Map a rejected response onto the error taxonomy. The detail comes from an
/// `error` or `message` field in a JSON body, else the raw body.
fn status_error(status: StatusCode, body: &str) -> Error {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());
    let detail = if detail.is_empty() { status.to_string() } else { detail };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized(detail),
        StatusCode::SERVICE_UNAVAILABLE => Error::UpstreamConfig(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Error::InvalidInput(detail),
        other => Error::HttpError(format!("{}: {detail}", other.as_u16())),
    }
}
