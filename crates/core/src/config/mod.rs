//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (MIDRASH_*)
//! 2. TOML config file (if MIDRASH_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::generation::CacheGeneration;
use crate::policy::CacheabilityPolicy;
use crate::routes::{self, RouteTable};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (MIDRASH_*)
/// 2. TOML config file (if MIDRASH_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Cache generation tag; bump on every deploy.
    ///
    /// Set via MIDRASH_GENERATION environment variable.
    #[serde(default = "default_generation")]
    pub generation: String,

    /// Site origin the offline layer fronts.
    ///
    /// Set via MIDRASH_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Third-party asset hosts whose responses may be cached.
    #[serde(default = "default_trusted_hosts")]
    pub trusted_hosts: Vec<String>,

    /// URL substrings that are never cached (identity widget traffic).
    #[serde(default = "default_deny_markers")]
    pub deny_markers: Vec<String>,

    /// Paths seeded into the static cache at install.
    #[serde(default = "default_static_manifest")]
    pub static_manifest: Vec<String>,

    /// Path of the cached document served to offline navigations.
    #[serde(default = "default_offline_shell")]
    pub offline_shell: String,

    /// Regexes for script/style/font/icon assets (cache-first).
    #[serde(default = "default_static_patterns")]
    pub static_patterns: Vec<String>,

    /// Regexes for API and auth endpoints (network-first).
    #[serde(default = "default_network_first_patterns")]
    pub network_first_patterns: Vec<String>,

    /// Regexes for images (cache-first into the image cache).
    #[serde(default = "default_image_patterns")]
    pub image_patterns: Vec<String>,

    /// Path to the SQLite cache database.
    ///
    /// Set via MIDRASH_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for upstream requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Largest response body stored in a cache; bigger responses are still
    /// served. Also caps request bodies forwarded by the proxy.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Upstream request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Address the local proxy listens on.
    ///
    /// Set via MIDRASH_LISTEN_ADDR environment variable.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Base path of the content store endpoints, relative to the origin.
    #[serde(default = "default_content_api_base")]
    pub content_api_base: String,

    /// Background sync tag that triggers the data-sync hook.
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,

    /// Title of the notification shown for a push without payload.
    #[serde(default = "default_notification_title")]
    pub notification_title: String,

    /// Body of the notification shown for a push without payload.
    #[serde(default = "default_notification_body")]
    pub notification_body: String,
}

fn default_generation() -> String {
    "v1".into()
}

fn default_origin() -> String {
    "http://127.0.0.1:8888".into()
}

fn default_trusted_hosts() -> Vec<String> {
    vec![
        "fonts.googleapis.com".into(),
        "fonts.gstatic.com".into(),
        "firebasestorage.googleapis.com".into(),
    ]
}

fn default_deny_markers() -> Vec<String> {
    vec!["/.netlify/identity".into(), "identity-widget".into()]
}

fn default_static_manifest() -> Vec<String> {
    vec![
        "/".into(),
        "/index.html".into(),
        "/logo.png".into(),
        "/hero-bg.jpg".into(),
        "/manifest.json".into(),
    ]
}

fn default_offline_shell() -> String {
    "/index.html".into()
}

fn to_owned_list(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| (*p).to_string()).collect()
}

fn default_static_patterns() -> Vec<String> {
    to_owned_list(routes::DEFAULT_STATIC_PATTERNS)
}

fn default_network_first_patterns() -> Vec<String> {
    to_owned_list(routes::DEFAULT_NETWORK_FIRST_PATTERNS)
}

fn default_image_patterns() -> Vec<String> {
    to_owned_list(routes::DEFAULT_IMAGE_PATTERNS)
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./midrash-cache.sqlite")
}

fn default_user_agent() -> String {
    "midrash-offline/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".into()
}

fn default_content_api_base() -> String {
    "/api".into()
}

fn default_sync_tag() -> String {
    "sync-data".into()
}

fn default_notification_title() -> String {
    "בית המדרש".into()
}

fn default_notification_body() -> String {
    "יש עדכון חדש באתר".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            generation: default_generation(),
            origin: default_origin(),
            trusted_hosts: default_trusted_hosts(),
            deny_markers: default_deny_markers(),
            static_manifest: default_static_manifest(),
            offline_shell: default_offline_shell(),
            static_patterns: default_static_patterns(),
            network_first_patterns: default_network_first_patterns(),
            image_patterns: default_image_patterns(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            listen_addr: default_listen_addr(),
            content_api_base: default_content_api_base(),
            sync_tag: default_sync_tag(),
            notification_title: default_notification_title(),
            notification_body: default_notification_body(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `MIDRASH_`
    /// 2. TOML file from `MIDRASH_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file or environment cannot be parsed, or
    /// validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("MIDRASH_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("MIDRASH_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    pub fn cache_generation(&self) -> CacheGeneration {
        CacheGeneration::new(self.generation.clone())
    }

    /// Parsed site origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })
    }

    /// Compile the three pattern groups into a route table.
    pub fn route_table(&self) -> Result<RouteTable, ConfigError> {
        RouteTable::from_patterns(
            self.static_patterns.as_slice(),
            self.network_first_patterns.as_slice(),
            self.image_patterns.as_slice(),
        )
        .map_err(|e| ConfigError::Invalid { field: "patterns".into(), reason: e.to_string() })
    }

    pub fn cacheability_policy(&self) -> Result<CacheabilityPolicy, ConfigError> {
        Ok(CacheabilityPolicy::new(&self.origin_url()?, &self.trusted_hosts, &self.deny_markers))
    }

    /// Resolve a site-relative path (manifest entry, shell) against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
        self.origin_url()?
            .join(path)
            .map_err(|e| ConfigError::Invalid { field: "path".into(), reason: format!("{path}: {e}") })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.generation, "v1");
        assert_eq!(config.db_path, PathBuf::from("./midrash-cache.sqlite"));
        assert_eq!(config.user_agent, "midrash-offline/0.1");
        assert_eq!(config.max_bytes, 5_242_880);
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.offline_shell, "/index.html");
        assert!(config.static_manifest.contains(&"/index.html".to_string()));
        assert_eq!(config.sync_tag, "sync-data");
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_cache_generation_names() {
        let config = AppConfig { generation: "2024-09-01".into(), ..Default::default() };
        assert_eq!(config.cache_generation().names()[0], "static-2024-09-01");
    }

    #[test]
    fn test_resolve_manifest_path() {
        let config = AppConfig { origin: "https://beit-midrash.example".into(), ..Default::default() };
        let url = config.resolve("/index.html").unwrap();
        assert_eq!(url.as_str(), "https://beit-midrash.example/index.html");
    }

    #[test]
    fn test_route_table_from_defaults() {
        let table = AppConfig::default().route_table().unwrap();
        assert!(!table.routes().is_empty());
    }

    #[test]
    fn test_load_layers_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "midrash.toml",
                r#"
                generation = "v7"
                origin = "https://beit-midrash.example"
                trusted_hosts = ["cdn.example.net"]
                "#,
            )?;
            jail.set_env("MIDRASH_CONFIG_FILE", "midrash.toml");
            jail.set_env("MIDRASH_GENERATION", "v8");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.generation, "v8");
            assert_eq!(config.origin, "https://beit-midrash.example");
            assert_eq!(config.trusted_hosts, vec!["cdn.example.net".to_string()]);
            Ok(())
        });
    }
}
