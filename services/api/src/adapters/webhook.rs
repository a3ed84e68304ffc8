//! services/api/src/adapters/webhook.rs
//!
//! Best-effort notifications to an external automation webhook.

use coaching_core::domain::Notification;
use coaching_core::ports::Notifier;
use reqwest::Client;
use tracing::{debug, warn};

/// Posts each notification as JSON on a detached task. The caller never waits
/// and never sees a failure.
#[derive(Clone)]
pub struct WebhookNotifier {
    http: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(http: Client, url: String) -> Self {
        Self { http, url }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, notification: Notification) {
        let http = self.http.clone();
        let url = self.url.clone();
        tokio::spawn(async move {
            match http.post(&url).json(&notification).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(status = %response.status(), "Webhook delivered");
                }
                Ok(response) => {
                    warn!(status = %response.status(), "Webhook rejected notification");
                }
                Err(e) => {
                    warn!(error = %e, "Webhook delivery failed");
                }
            }
        });
    }
}

/// Used when no webhook is configured.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, notification: Notification) {
        debug!(?notification, "No webhook configured, notification dropped");
    }
}
