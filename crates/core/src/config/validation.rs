//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `generation` is empty or contains whitespace
    /// - `origin` is not an absolute http(s) URL
    /// - a manifest entry or the offline shell is not site-relative
    /// - a route pattern fails to compile
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    ///
    /// Returns `ConfigError::Missing` if the static manifest is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.is_empty() || self.generation.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                field: "generation".into(),
                reason: "must be a non-empty tag without whitespace".into(),
            });
        }

        let origin = self.origin_url()?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid { field: "origin".into(), reason: "must be an http(s) URL".into() });
        }

        if self.static_manifest.is_empty() {
            return Err(ConfigError::Missing {
                field: "static_manifest".into(),
                hint: "list the offline shell assets, e.g. [\"/\", \"/index.html\"]".into(),
            });
        }
        for path in self.static_manifest.iter().chain(std::iter::once(&self.offline_shell)) {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid {
                    field: "static_manifest".into(),
                    reason: format!("{path} must start with '/'"),
                });
            }
        }

        self.route_table()?;

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if !self.static_manifest.contains(&self.offline_shell) {
            tracing::warn!(
                offline_shell = %self.offline_shell,
                "offline_shell is not in static_manifest; offline navigations will fail until it is cached"
            );
        }

        Ok(())
    }
}
