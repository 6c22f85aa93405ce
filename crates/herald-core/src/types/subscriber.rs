//! Subscribers, their per-provider channel credentials, preference
//! resolution results, and delivery integrations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::message::ChannelKind;

/// Recipient of a workflow run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    /// Per-provider delivery credentials (device tokens, chat webhooks).
    #[serde(default)]
    pub channels: Vec<SubscriberChannel>,
}

impl Subscriber {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    /// Channels registered for one provider, optionally narrowed to one
    /// integration identifier.
    pub fn channels_for(
        &self,
        provider_id: &str,
        identifier: Option<&str>,
    ) -> Vec<&SubscriberChannel> {
        self.channels
            .iter()
            .filter(|c| c.provider_id == provider_id)
            .filter(|c| match identifier {
                Some(ident) => c.integration_identifier.as_deref() == Some(ident),
                None => true,
            })
            .collect()
    }
}

/// Credentials a subscriber registered for one provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriberChannel {
    pub provider_id: String,
    #[serde(default)]
    pub integration_identifier: Option<String>,
    #[serde(default)]
    pub credentials: ChannelCredentials,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelCredentials {
    #[serde(default)]
    pub device_tokens: Vec<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Provider-specific channel handle (e.g. a chat room).
    #[serde(default)]
    pub channel: Option<String>,
}

/// A configured delivery integration of an environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,
    pub provider_id: String,
    pub channel: ChannelKind,
    /// Optional stable handle used to pick between same-provider
    /// integrations.
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub credentials: serde_json::Value,
    pub active: bool,
    #[serde(default)]
    pub primary: bool,
}

/// Where a channel preference decision came from, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceSource {
    WorkflowResource,
    SubscriberGlobal,
    SubscriberWorkflow,
    UserWorkflow,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChannelPreference {
    pub enabled: bool,
    pub source: PreferenceSource,
}

/// Resolved subscriber preferences for one workflow: highest-precedence
/// source wins per channel; unset channels default to enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberPreferences {
    pub workflow_enabled: bool,
    #[serde(default)]
    pub channels: HashMap<ChannelKind, ChannelPreference>,
}

impl Default for SubscriberPreferences {
    fn default() -> Self {
        Self {
            workflow_enabled: true,
            channels: HashMap::new(),
        }
    }
}

impl SubscriberPreferences {
    pub fn channel_enabled(&self, channel: ChannelKind) -> bool {
        if !self.workflow_enabled {
            return false;
        }
        self.channels.get(&channel).map(|p| p.enabled).unwrap_or(true)
    }
}

/// Result of evaluating a step's condition filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterVerdict {
    pub passed: bool,
    #[serde(default)]
    pub conditions: Vec<EvaluatedCondition>,
}

impl FilterVerdict {
    pub fn passed() -> Self {
        Self {
            passed: true,
            conditions: Vec::new(),
        }
    }
}

/// One evaluated condition, kept for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatedCondition {
    pub field: String,
    pub expected: serde_json::Value,
    pub actual: serde_json::Value,
    pub passed: bool,
}

/// Attachment staged for delivery alongside a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub mime: String,
    #[serde(default)]
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_for_provider() {
        let mut sub = Subscriber::new("sub-1");
        sub.channels.push(SubscriberChannel {
            provider_id: "fcm".into(),
            integration_identifier: None,
            credentials: ChannelCredentials {
                device_tokens: vec!["t1".into()],
                ..Default::default()
            },
        });
        sub.channels.push(SubscriberChannel {
            provider_id: "fcm".into(),
            integration_identifier: Some("secondary".into()),
            credentials: ChannelCredentials::default(),
        });

        assert_eq!(sub.channels_for("fcm", None).len(), 2);
        assert_eq!(sub.channels_for("fcm", Some("secondary")).len(), 1);
        assert!(sub.channels_for("apns", None).is_empty());
    }

    #[test]
    fn test_preference_defaults_enabled() {
        let prefs = SubscriberPreferences::default();
        assert!(prefs.channel_enabled(ChannelKind::Email));
    }

    #[test]
    fn test_workflow_disabled_wins() {
        let mut prefs = SubscriberPreferences::default();
        prefs.channels.insert(
            ChannelKind::Sms,
            ChannelPreference {
                enabled: true,
                source: PreferenceSource::UserWorkflow,
            },
        );
        prefs.workflow_enabled = false;
        assert!(!prefs.channel_enabled(ChannelKind::Sms));
    }

    #[test]
    fn test_channel_preference_disabled() {
        let mut prefs = SubscriberPreferences::default();
        prefs.channels.insert(
            ChannelKind::Push,
            ChannelPreference {
                enabled: false,
                source: PreferenceSource::SubscriberWorkflow,
            },
        );
        assert!(!prefs.channel_enabled(ChannelKind::Push));
        assert!(prefs.channel_enabled(ChannelKind::Email));
    }
}
