//! HTTP surface of the offline proxy.
//!
//! The proxy sits in front of the site origin the way a service worker sits
//! in front of the network: every request that is not a `/_worker/*` or
//! `/_content/*` control route goes through [`CacheManager::on_fetch`].

use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use url::Url;

use midrash_client::fetch::{Destination, FetchRequest, FetchResponse, resolve};
use midrash_client::worker::{CacheManager, ClientMessage, WindowAction, WorkerMessage};
use midrash_client::{ContentClient, ContentEndpoint};

use crate::error::ProxyError;

/// Response header naming where the body came from.
pub const SOURCE_HEADER: &str = "x-midrash-source";

/// Headers that describe one hop, never forwarded.
const HOP_HEADERS: &[HeaderName] = &[
    header::HOST,
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::TE,
    header::UPGRADE,
    header::CONTENT_LENGTH,
    header::ACCEPT_ENCODING,
    header::CONTENT_ENCODING,
];

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<CacheManager>,
    pub content: Arc<ContentClient>,
    pub origin: Url,
    /// Largest request body forwarded upstream.
    pub max_body: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/_worker/message", post(message_handler))
        .route("/_worker/sync", post(sync_handler))
        .route("/_worker/push", post(push_handler))
        .route("/_worker/notificationclick", post(notification_click_handler))
        .route("/_worker/state", get(state_handler))
        .route("/_content/{slug}", get(content_handler))
        .fallback(proxy_handler)
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageReply {
    Client(ClientMessage),
    Ack {
        #[serde(rename = "type")]
        kind: &'static str,
    },
}

/// POST /_worker/message: `{"type":"SKIP_WAITING"}` or `{"type":"CLEAR_CACHE"}`.
///
/// The binary activates right after install, so the manager is never left
/// waiting and `SKIP_WAITING` is acknowledged without effect.
async fn message_handler(
    State(state): State<AppState>, Json(message): Json<WorkerMessage>,
) -> Result<Json<MessageReply>, ProxyError> {
    let reply = state.manager.on_message(message).await?;
    Ok(Json(match reply {
        Some(reply) => MessageReply::Client(reply),
        None => MessageReply::Ack { kind: "OK" },
    }))
}

#[derive(Debug, Deserialize)]
struct SyncParams {
    tag: String,
}

async fn sync_handler(State(state): State<AppState>, Json(params): Json<SyncParams>) -> Json<Value> {
    let ran = state.manager.on_sync(&params.tag).await;
    Json(json!({ "tag": params.tag, "ran": ran }))
}

/// POST /_worker/push: raw push body, possibly empty.
async fn push_handler(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let data = (!body.is_empty()).then_some(body.as_ref());
    Json(state.manager.on_push(data).await)
}

#[derive(Debug, Default, Deserialize)]
struct ClickParams {
    #[serde(default, alias = "link")]
    url: Option<String>,
}

async fn notification_click_handler(State(state): State<AppState>, Json(params): Json<ClickParams>) -> Json<Value> {
    let body = match state.manager.on_notification_click(params.url.as_deref()).await {
        WindowAction::Focused(page) => json!({ "action": "focused", "page": page }),
        WindowAction::Opened(page) => json!({ "action": "opened", "page": page }),
    };
    Json(body)
}

async fn state_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "state": state.manager.state().await.to_string(),
        "generation": state.manager.config().generation.tag(),
    }))
}

/// GET /_content/{slug}: content document with mirror fallback.
async fn content_handler(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Response, ProxyError> {
    let endpoint = ContentEndpoint::from_slug(&slug)
        .ok_or_else(|| ProxyError::InvalidInput(format!("unknown content endpoint: {slug}")))?;
    let doc = state.content.fetch(endpoint).await;
    Ok(([(SOURCE_HEADER, doc.source.as_str())], Json(doc.document)).into_response())
}

fn destination(headers: &HeaderMap) -> Destination {
    let value = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    match value("sec-fetch-dest") {
        Some(dest) => Destination::from_fetch_dest(dest),
        None if value("sec-fetch-mode") == Some("navigate") => Destination::Document,
        None => Destination::Empty,
    }
}

fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !HOP_HEADERS.contains(*name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Rebuild a request against the origin from what the page sent us.
async fn to_fetch_request(state: &AppState, request: Request) -> Result<FetchRequest, ProxyError> {
    let (parts, body) = request.into_parts();
    let target = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let url = resolve(&state.origin, target).map_err(|e| ProxyError::InvalidInput(e.to_string()))?;

    let mut fetch = FetchRequest::new(parts.method.clone(), url)
        .with_destination(destination(&parts.headers))
        .with_headers(forwarded_headers(&parts.headers));

    if parts.method != Method::GET && parts.method != Method::HEAD {
        let bytes = axum::body::to_bytes(body, state.max_body)
            .await
            .map_err(|e| ProxyError::InvalidInput(format!("request body: {e}")))?;
        if !bytes.is_empty() {
            fetch = fetch.with_body(bytes);
        }
    }
    Ok(fetch)
}

fn to_response(upstream: FetchResponse, source: &'static str) -> Response {
    let mut response = Response::new(Body::from(upstream.bytes));
    *response.status_mut() = upstream.status;

    let headers = response.headers_mut();
    for (name, value) in upstream.headers.iter().filter(|(name, _)| !HOP_HEADERS.contains(*name)) {
        headers.append(name.clone(), value.clone());
    }
    headers.insert(HeaderName::from_static(SOURCE_HEADER), HeaderValue::from_static(source));
    response
}

async fn proxy_handler(State(state): State<AppState>, request: Request) -> Result<Response, ProxyError> {
    let fetch = to_fetch_request(&state, request).await?;
    let outcome = state.manager.on_fetch(&fetch).await?;

    tracing::debug!(
        method = %fetch.method,
        url = %fetch.url,
        status = outcome.response.status.as_u16(),
        source = outcome.source.as_str(),
        "served"
    );

    // Background cache work keeps running after the response is sent.
    Ok(to_response(outcome.response, outcome.source.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use axum::http::StatusCode;
    use midrash_client::fetch::{FetchClient, FetchConfig, Network};
    use midrash_client::worker::{CacheManagerConfig, PageRegistry};
    use midrash_core::{AppConfig, CacheStore};
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn start_origin() -> SocketAddr {
        let page = |body: &'static str| get(move || async move { ([(header::CONTENT_TYPE, "text/html")], body) });
        let app = Router::new()
            .route("/", page("<html>home</html>"))
            .route("/index.html", page("<html>shell</html>"))
            .route("/logo.png", page("png"))
            .route("/hero-bg.jpg", page("jpg"))
            .route("/manifest.json", page("{}"))
            .route("/app.css", page("body{}"))
            .route("/api/prayer-times", get(|| async { Json(json!({ "weekday": [] })) }));
        serve(app).await
    }

    async fn start_proxy(origin: SocketAddr) -> (SocketAddr, AppState) {
        let config = AppConfig { origin: format!("http://{origin}"), ..Default::default() };
        let store = CacheStore::open_in_memory().await.unwrap();
        let network = Arc::new(FetchClient::new(FetchConfig::from_app_config(&config)).unwrap());
        let manager = Arc::new(CacheManager::new(
            CacheManagerConfig::from_app_config(&config).unwrap(),
            store.clone(),
            network,
            Arc::new(PageRegistry::new()),
            Arc::new(LogNotifier),
        ));
        manager.on_install().await.unwrap();
        manager.on_activate().await.unwrap();

        let state = AppState {
            manager,
            content: Arc::new(ContentClient::from_app_config(&config, store).unwrap()),
            origin: config.origin_url().unwrap(),
            max_body: config.max_bytes,
        };
        (serve(router(state.clone())).await, state)
    }

    fn client() -> FetchClient {
        FetchClient::new(FetchConfig::default()).unwrap()
    }

    fn proxy_url(addr: SocketAddr, path: &str) -> Url {
        Url::parse(&format!("http://{addr}{path}")).unwrap()
    }

    fn post_json(url: Url, body: &str) -> FetchRequest {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        FetchRequest::new(Method::POST, url)
            .with_headers(headers)
            .with_body(Bytes::copy_from_slice(body.as_bytes()))
    }

    fn source(response: &FetchResponse) -> Option<&str> {
        response.headers.get(SOURCE_HEADER).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn test_destination_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(destination(&headers), Destination::Empty);
        headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
        assert_eq!(destination(&headers), Destination::Document);
        headers.insert("sec-fetch-dest", HeaderValue::from_static("image"));
        assert_eq!(destination(&headers), Destination::Image);
    }

    #[test]
    fn test_hop_headers_not_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("127.0.0.1:8787"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/css"));
        let forwarded = forwarded_headers(&headers);
        assert!(forwarded.get(header::HOST).is_none());
        assert_eq!(forwarded.get(header::ACCEPT).unwrap(), "text/css");
    }

    #[tokio::test]
    async fn test_seeded_root_served_from_cache() {
        let origin = start_origin().await;
        let (proxy, _state) = start_proxy(origin).await;

        let response = client().fetch(&FetchRequest::get(proxy_url(proxy, "/"))).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(source(&response), Some("cache"));
        assert_eq!(response.bytes, Bytes::from_static(b"<html>home</html>"));
    }

    #[tokio::test]
    async fn test_static_asset_cached_after_first_request() {
        let origin = start_origin().await;
        let (proxy, state) = start_proxy(origin).await;

        let first = client().fetch(&FetchRequest::get(proxy_url(proxy, "/app.css"))).await.unwrap();
        assert_eq!(source(&first), Some("network"));
        assert_eq!(state.manager.store().entry_count("dynamic-v1").await.unwrap(), 1);

        let second = client().fetch(&FetchRequest::get(proxy_url(proxy, "/app.css"))).await.unwrap();
        assert_eq!(source(&second), Some("cache"));
    }

    #[tokio::test]
    async fn test_clear_cache_message() {
        let origin = start_origin().await;
        let (proxy, state) = start_proxy(origin).await;

        let request = post_json(proxy_url(proxy, "/_worker/message"), r#"{"type":"CLEAR_CACHE"}"#);
        let response = client().fetch(&request).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&response.bytes).unwrap();
        assert_eq!(body, json!({ "type": "CACHE_CLEARED" }));
        assert!(state.manager.store().cache_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skip_waiting_when_already_active() {
        let origin = start_origin().await;
        let (proxy, state) = start_proxy(origin).await;

        let skip = post_json(proxy_url(proxy, "/_worker/message"), r#"{"type":"SKIP_WAITING"}"#);
        let response = client().fetch(&skip).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&response.bytes).unwrap();
        assert_eq!(body, json!({ "type": "OK" }));
        assert_eq!(state.manager.state().await.to_string(), "activated");
        assert!(!state.manager.store().cache_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_without_body_shows_default() {
        let origin = start_origin().await;
        let (proxy, _state) = start_proxy(origin).await;

        let request = FetchRequest::new(Method::POST, proxy_url(proxy, "/_worker/push"));
        let body: Value = serde_json::from_slice(&client().fetch(&request).await.unwrap().bytes).unwrap();
        assert_eq!(body["title"], "בית המדרש");
    }

    #[tokio::test]
    async fn test_content_route() {
        let origin = start_origin().await;
        let (proxy, _state) = start_proxy(origin).await;

        let live = client()
            .fetch(&FetchRequest::get(proxy_url(proxy, "/_content/prayer-times")))
            .await
            .unwrap();
        assert_eq!(source(&live), Some("live"));

        let unknown = client().fetch(&FetchRequest::get(proxy_url(proxy, "/_content/sermons"))).await.unwrap();
        assert_eq!(unknown.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_state_route() {
        let origin = start_origin().await;
        let (proxy, _state) = start_proxy(origin).await;

        let response = client().fetch(&FetchRequest::get(proxy_url(proxy, "/_worker/state"))).await.unwrap();
        let body: Value = serde_json::from_slice(&response.bytes).unwrap();
        assert_eq!(body, json!({ "state": "activated", "generation": "v1" }));
    }
}
