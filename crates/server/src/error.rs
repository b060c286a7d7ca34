//! HTTP mapping for offline-layer errors.
//!
//! Every error leaves the proxy as a JSON body carrying the stable code
//! prefix and the localized message the admin screens show.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use midrash_core::Error;

/// Errors returned by the proxy's handlers.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Malformed request to one of the proxy's own routes.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Offline(#[from] Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ProxyError::Offline(err) => match err {
                Error::InvalidInput(_) | Error::InvalidUrl(_) => StatusCode::BAD_REQUEST,
                Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                Error::Network(_) | Error::HttpError(_) => StatusCode::BAD_GATEWAY,
                Error::FetchTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                Error::UpstreamConfig(_) | Error::InstallFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
                Error::Database(_) | Error::MigrationFailed(_) | Error::CorruptEntry(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn localized_message(&self) -> String {
        match self {
            ProxyError::InvalidInput(reason) => Error::InvalidInput(reason.clone()).localized_message(),
            ProxyError::Offline(err) => err.localized_message(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        }
        let body = json!({ "error": self.to_string(), "message": self.localized_message() });
        (status, Json(body)).into_response()
    }
}
