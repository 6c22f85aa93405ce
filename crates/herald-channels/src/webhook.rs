//! Outbound webhook notifier — fire-and-forget HTTP delivery of message
//! lifecycle events. Failures are logged and never reach the send path.

use async_trait::async_trait;
use serde_json::Value;

use herald_core::traits::{WebhookEvent, WebhookNotifier};

pub struct HttpWebhookNotifier {
    url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpWebhookNotifier {
    pub fn new(url: &str, timeout_secs: u64) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl WebhookNotifier for HttpWebhookNotifier {
    async fn send(&self, event: WebhookEvent, object_type: &str, payload: Value) {
        let event_name = match event {
            WebhookEvent::MessageSent => "message.sent",
            WebhookEvent::MessageFailed => "message.failed",
        };
        let body = serde_json::json!({
            "event": event_name,
            "object_type": object_type,
            "payload": payload,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let url = self.url.clone();
        let client = self.client.clone();
        let timeout = std::time::Duration::from_secs(self.timeout_secs);
        // Detached so a slow endpoint never stalls the send path.
        tokio::spawn(async move {
            match client.post(&url).json(&body).timeout(timeout).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::trace!(event_name, "Webhook notification delivered");
                }
                Ok(resp) => {
                    tracing::warn!(event_name, status = %resp.status(), "Webhook endpoint rejected notification");
                }
                Err(e) => {
                    tracing::warn!(event_name, error = %e, "Webhook notification failed");
                }
            }
        });
    }
}
