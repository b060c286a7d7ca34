//! Push payloads and notification display.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A notification to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Page to open when the notification is clicked.
    #[serde(default)]
    pub link: Option<String>,
}

/// Push message body as sent by the push gateway.
///
/// Every field is optional; missing fields fall back to the default
/// notification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, alias = "url")]
    pub link: Option<String>,
}

impl PushPayload {
    /// Parse a raw push body. Empty or non-JSON bodies yield `None`.
    pub fn parse(data: Option<&[u8]>) -> Option<Self> {
        let data = data.filter(|d| !d.is_empty())?;
        match serde_json::from_slice(data) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::debug!(error = %e, "push payload is not JSON, showing default notification");
                None
            }
        }
    }

    pub fn into_notification(self, fallback: &Notification) -> Notification {
        Notification {
            title: self.title.filter(|t| !t.is_empty()).unwrap_or_else(|| fallback.title.clone()),
            body: self.body.filter(|b| !b.is_empty()).unwrap_or_else(|| fallback.body.clone()),
            link: self.link.or_else(|| fallback.link.clone()),
        }
    }
}

/// Displays notifications to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show(&self, notification: &Notification);
}
