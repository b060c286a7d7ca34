//! Notification display for the headless host.

use async_trait::async_trait;

use midrash_client::worker::{Notification, Notifier};

/// Writes notifications to the log; the host has no screen to show them on.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn show(&self, notification: &Notification) {
        tracing::info!(
            title = %notification.title,
            body = %notification.body,
            link = ?notification.link,
            "notification"
        );
    }
}
