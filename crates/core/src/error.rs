//! Unified error types for midrash-web.
//!
//! Display strings carry a stable code prefix so log lines and HTTP bodies
//! can be grepped by class.

use tokio_rusqlite::rusqlite;

/// Unified error types for the offline layer and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed request body or invalid parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Cache storage operation failed (includes quota/IO failures).
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Stored entry could not be decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// No connectivity, DNS failure, connection reset.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Non-success HTTP status from a collaborator.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// Seeding the static cache failed; nothing was stored.
    #[error("INSTALL_FAILED: {0}")]
    InstallFailed(String),

    /// Missing or rejected bearer token (401/403 class).
    #[error("AUTH_ERROR: {0}")]
    Unauthorized(String),

    /// Upstream service is misconfigured (503 class, e.g. missing credentials).
    #[error("UPSTREAM_CONFIG: {0}")]
    UpstreamConfig(String),
}

impl Error {
    /// Whether this error came from the transport rather than from a response.
    ///
    /// Only these errors trigger cache and offline-shell fallbacks.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_) | Error::FetchTimeout(_))
    }

    /// User-facing message shown inline by the admin screens.
    pub fn localized_message(&self) -> String {
        match self {
            Error::Unauthorized(_) => "אין הרשאה לבצע פעולה זו. יש להתחבר מחדש.".to_string(),
            Error::UpstreamConfig(_) => {
                "השירות אינו מוגדר כראוי. יש לבדוק את הגדרות השרת (משתני סביבה).".to_string()
            }
            Error::InvalidInput(reason) => format!("הבקשה אינה תקינה: {reason}"),
            Error::Network(_) | Error::FetchTimeout(_) => "אין חיבור לרשת. נסו שוב מאוחר יותר.".to_string(),
            other => format!("אירעה שגיאה: {other}"),
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::CorruptEntry(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InstallFailed("https://example.com/app.css returned 404".to_string());
        assert!(err.to_string().starts_with("INSTALL_FAILED: "));
        assert!(err.to_string().contains("app.css"));
    }

    #[test]
    fn test_is_network() {
        assert!(Error::Network("offline".into()).is_network());
        assert!(Error::FetchTimeout("20s".into()).is_network());
        assert!(!Error::HttpError("status 500".into()).is_network());
        assert!(!Error::Unauthorized("no token".into()).is_network());
    }

    #[test]
    fn test_localized_messages_are_distinct() {
        let auth = Error::Unauthorized("x".into()).localized_message();
        let upstream = Error::UpstreamConfig("x".into()).localized_message();
        assert_ne!(auth, upstream);
        assert!(upstream.contains("הגדרות"));
    }

    #[test]
    fn test_invalid_input_keeps_reason() {
        let msg = Error::InvalidInput("missing field `title`".into()).localized_message();
        assert!(msg.contains("missing field `title`"));
    }
}
