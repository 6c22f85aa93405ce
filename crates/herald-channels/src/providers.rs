//! Provider handlers — the outbound edge of a channel send.
//!
//! Each handler takes a prepared [`Delivery`] and returns the provider's
//! external identifier. Handlers are looked up by provider id from the
//! resolved integration.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use herald_core::error::{HeraldError, Result};
use herald_core::types::{Attachment, RecipientTarget};

/// Provider id of the synthetic WhatsApp-Business chat channel derived
/// from the subscriber's phone number.
pub const WHATSAPP_BUSINESS: &str = "whatsapp_business";

/// One prepared provider call.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub recipient: RecipientTarget,
    pub subject: Option<String>,
    pub title: Option<String>,
    pub body: String,
    /// Integration credentials (provider-specific JSON).
    pub credentials: Value,
    /// Merged overrides for this send.
    pub overrides: Value,
    pub payload: Value,
    pub attachments: Vec<Attachment>,
}

#[async_trait]
pub trait ProviderHandler: Send + Sync {
    fn provider_id(&self) -> &str;
    /// Deliver and return the provider's message identifier.
    async fn deliver(&self, delivery: &Delivery) -> Result<String>;
}

/// Registry of provider handlers keyed by provider id.
#[derive(Default)]
pub struct ProviderRegistry {
    handlers: HashMap<String, Arc<dyn ProviderHandler>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ProviderHandler>) {
        self.handlers
            .insert(handler.provider_id().to_string(), handler);
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn ProviderHandler>> {
        self.handlers.get(provider_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// SMTP email delivery via lettre.
pub struct SmtpEmailProvider {
    timeout_secs: u64,
}

impl SmtpEmailProvider {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

#[async_trait]
impl ProviderHandler for SmtpEmailProvider {
    fn provider_id(&self) -> &str {
        "smtp"
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<String> {
        use lettre::message::header::ContentType;
        use lettre::message::Mailbox;
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage};

        let RecipientTarget::Email(to) = &delivery.recipient else {
            return Err(HeraldError::Provider("smtp: recipient is not an email".into()));
        };

        let host = delivery.credentials["host"]
            .as_str()
            .ok_or_else(|| HeraldError::Provider("smtp: missing host credential".into()))?;
        let user = delivery.credentials["user"].as_str().unwrap_or_default();
        let password = delivery.credentials["password"].as_str().unwrap_or_default();
        let from = delivery
            .overrides
            .get("from")
            .and_then(|v| v.as_str())
            .or_else(|| delivery.credentials["from"].as_str())
            .ok_or_else(|| HeraldError::Provider("smtp: no from address".into()))?;

        let from_mailbox: Mailbox = from
            .parse()
            .map_err(|e| HeraldError::Provider(format!("smtp: invalid from: {e}")))?;
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| HeraldError::Provider(format!("smtp: invalid to: {e}")))?;

        let message_id = format!("<{}@herald>", uuid::Uuid::new_v4());
        let email = LettreMessage::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(delivery.subject.as_deref().unwrap_or_default())
            .message_id(Some(message_id.clone()))
            .header(ContentType::TEXT_HTML)
            .body(delivery.body.clone())
            .map_err(|e| HeraldError::Provider(format!("smtp: build email: {e}")))?;

        let creds = Credentials::new(user.to_string(), password.to_string());
        let port = delivery.credentials["port"].as_u64().unwrap_or(587) as u16;
        let mailer = AsyncSmtpTransport::<lettre::Tokio1Executor>::starttls_relay(host)
            .map_err(|e| HeraldError::Provider(format!("smtp: relay: {e}")))?
            .port(port)
            .credentials(creds)
            .timeout(Some(std::time::Duration::from_secs(self.timeout_secs)))
            .build();

        mailer
            .send(email)
            .await
            .map_err(|e| HeraldError::Provider(format!("smtp: send: {e}")))?;

        tracing::info!("📤 Email sent to {to}");
        Ok(message_id)
    }
}

/// Generic HTTP SMS gateway: POST `{to, content}` to a configured
/// endpoint, expects `{"id": ...}` back.
pub struct HttpSmsProvider {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpSmsProvider {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl ProviderHandler for HttpSmsProvider {
    fn provider_id(&self) -> &str {
        "sms_gateway"
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<String> {
        let RecipientTarget::Phone(to) = &delivery.recipient else {
            return Err(HeraldError::Provider("sms: recipient is not a phone".into()));
        };
        let endpoint = delivery.credentials["endpoint"]
            .as_str()
            .ok_or_else(|| HeraldError::Provider("sms: missing endpoint credential".into()))?;

        let resp = self
            .client
            .post(endpoint)
            .json(&serde_json::json!({
                "to": to,
                "from": delivery.credentials["sender_id"].as_str().unwrap_or_default(),
                "content": delivery.body,
            }))
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| HeraldError::Provider(format!("sms: send failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(HeraldError::Provider(format!("sms: gateway error {status}: {body}")));
        }

        let result: Value = resp
            .json()
            .await
            .map_err(|e| HeraldError::Provider(format!("sms: invalid response: {e}")))?;
        Ok(result["id"].as_str().unwrap_or("unknown").to_string())
    }
}

/// FCM-shaped push gateway: one POST per batch of device tokens.
pub struct HttpPushProvider {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpPushProvider {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl ProviderHandler for HttpPushProvider {
    fn provider_id(&self) -> &str {
        "fcm"
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<String> {
        let RecipientTarget::DeviceTokens(tokens) = &delivery.recipient else {
            return Err(HeraldError::Provider("push: recipient has no device tokens".into()));
        };
        let endpoint = delivery.credentials["endpoint"]
            .as_str()
            .unwrap_or("https://fcm.googleapis.com/fcm/send");
        let server_key = delivery.credentials["server_key"].as_str().unwrap_or_default();

        let resp = self
            .client
            .post(endpoint)
            .header("Authorization", format!("key={server_key}"))
            .json(&serde_json::json!({
                "registration_ids": tokens,
                "notification": {
                    "title": delivery.title.clone().or_else(|| delivery.subject.clone()),
                    "body": delivery.body,
                },
                "data": delivery.payload,
            }))
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| HeraldError::Provider(format!("push: send failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(HeraldError::Provider(format!("push: gateway error {status}")));
        }

        let result: Value = resp
            .json()
            .await
            .map_err(|e| HeraldError::Provider(format!("push: invalid response: {e}")))?;
        Ok(result["multicast_id"]
            .as_i64()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unknown".to_string()))
    }
}

/// Chat delivery by webhook POST (Slack/Discord/Teams-shaped body).
pub struct ChatWebhookProvider {
    id: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl ChatWebhookProvider {
    pub fn new(id: &str, timeout_secs: u64) -> Self {
        Self {
            id: id.to_string(),
            client: reqwest::Client::new(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl ProviderHandler for ChatWebhookProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<String> {
        let RecipientTarget::WebhookUrl(url) = &delivery.recipient else {
            return Err(HeraldError::Provider(format!(
                "{}: recipient is not a webhook url",
                self.id
            )));
        };

        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({"text": delivery.body}))
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| HeraldError::Provider(format!("{}: send failed: {e}", self.id)))?;

        if resp.status().is_success() {
            Ok(uuid::Uuid::new_v4().to_string())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(HeraldError::Provider(format!(
                "{}: webhook error {status}: {body}",
                self.id
            )))
        }
    }
}

/// WhatsApp Business Cloud API text message to the subscriber's phone.
pub struct WhatsAppBusinessProvider {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl WhatsAppBusinessProvider {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl ProviderHandler for WhatsAppBusinessProvider {
    fn provider_id(&self) -> &str {
        WHATSAPP_BUSINESS
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<String> {
        let RecipientTarget::Phone(to) = &delivery.recipient else {
            return Err(HeraldError::Provider("whatsapp: recipient is not a phone".into()));
        };
        let phone_number_id = delivery.credentials["phone_number_id"]
            .as_str()
            .ok_or_else(|| HeraldError::Provider("whatsapp: missing phone_number_id".into()))?;
        let access_token = delivery.credentials["access_token"].as_str().unwrap_or_default();
        let url = format!("https://graph.facebook.com/v21.0/{phone_number_id}/messages");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {access_token}"))
            .json(&serde_json::json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": to,
                "type": "text",
                "text": {"preview_url": false, "body": delivery.body},
            }))
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| HeraldError::Provider(format!("whatsapp: request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(HeraldError::Provider(format!("whatsapp: API error {status}: {body}")));
        }

        let result: Value = resp
            .json()
            .await
            .map_err(|e| HeraldError::Provider(format!("whatsapp: invalid response: {e}")))?;
        Ok(result["messages"][0]["id"].as_str().unwrap_or("unknown").to_string())
    }
}

/// Loopback provider for demos and tests: records deliveries in memory
/// and can be flipped into failure mode.
pub struct LoopbackProvider {
    id: String,
    fail: AtomicBool,
    sent: Mutex<Vec<Delivery>>,
}

impl LoopbackProvider {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            fail: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::Relaxed);
    }

    pub fn sent(&self) -> Vec<Delivery> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ProviderHandler for LoopbackProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<String> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(HeraldError::Provider(format!("{}: simulated failure", self.id)));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(delivery.clone());
        Ok(format!("{}-{}", self.id, sent.len()))
    }
}

/// Default registry with one handler per built-in provider.
pub fn default_registry(timeout_secs: u64) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(SmtpEmailProvider::new(timeout_secs)));
    registry.register(Arc::new(HttpSmsProvider::new(timeout_secs)));
    registry.register(Arc::new(HttpPushProvider::new(timeout_secs)));
    registry.register(Arc::new(ChatWebhookProvider::new("slack", timeout_secs)));
    registry.register(Arc::new(ChatWebhookProvider::new("discord", timeout_secs)));
    registry.register(Arc::new(WhatsAppBusinessProvider::new(timeout_secs)));
    registry
}
