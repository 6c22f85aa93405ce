//! Tri-state send outcomes and the run-level delivery lifecycle rollup.

use serde::{Deserialize, Serialize};

/// Terminal status of a workflow run, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Completed,
    Failed,
    Canceled,
}

/// Detail code qualifying a lifecycle status or a skip/failure outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleDetail {
    /// Every step of the chain reached a terminal state.
    StepsCompleted,
    /// No active delivery integration for the channel.
    NoActiveIntegration,
    /// Fan-out channel found no delivery target at all.
    NoActiveChannel,
    MissingEmailAddress,
    MissingPhoneNumber,
    MissingChatWebhook,
    MissingDeviceTokens,
    ContentNotGenerated,
    ProviderError,
    FilteredByConditions,
    FilteredByPreferences,
    BridgeSkipRequested,
    /// Chain stopped because a step with halt-on-failure failed.
    StepFailureHalted,
    /// Transient webhook-filter failure; the queue will redeliver.
    WebhookFilterUnavailable,
    /// Canceled digest job with no active follower window.
    DigestWindowClosed,
    EnqueueFailed,
}

/// Denormalized run outcome (status + detail), written by the orchestrator
/// whenever a run halts or completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryLifecycle {
    pub status: LifecycleStatus,
    pub detail: LifecycleDetail,
}

impl DeliveryLifecycle {
    pub fn completed() -> Self {
        Self {
            status: LifecycleStatus::Completed,
            detail: LifecycleDetail::StepsCompleted,
        }
    }

    pub fn failed(detail: LifecycleDetail) -> Self {
        Self {
            status: LifecycleStatus::Failed,
            detail,
        }
    }

    pub fn canceled(detail: LifecycleDetail) -> Self {
        Self {
            status: LifecycleStatus::Canceled,
            detail,
        }
    }
}

/// Why a step did not fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipReason {
    pub detail: LifecycleDetail,
    pub message: String,
}

/// Why a step failed. `backoff` marks transient signatures that suppress
/// chaining without canceling siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendFailure {
    pub detail: LifecycleDetail,
    pub message: String,
    #[serde(default)]
    pub backoff: bool,
}

/// The shared result contract of the dispatcher and every channel sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SendOutcome {
    Success,
    Failed(SendFailure),
    Skipped(SkipReason),
}

impl SendOutcome {
    pub fn failed(detail: LifecycleDetail, message: impl Into<String>) -> Self {
        SendOutcome::Failed(SendFailure {
            detail,
            message: message.into(),
            backoff: false,
        })
    }

    pub fn failed_backoff(detail: LifecycleDetail, message: impl Into<String>) -> Self {
        SendOutcome::Failed(SendFailure {
            detail,
            message: message.into(),
            backoff: true,
        })
    }

    pub fn skipped(detail: LifecycleDetail, message: impl Into<String>) -> Self {
        SendOutcome::Skipped(SkipReason {
            detail,
            message: message.into(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Success)
    }
}

/// Output of user-defined bridge code for a channel step. `outputs` may
/// carry subject/body/title that replace compiled template content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeOutput {
    #[serde(default)]
    pub outputs: serde_json::Value,
    /// Explicit request to skip the step.
    #[serde(default)]
    pub skip: bool,
}

impl BridgeOutput {
    pub fn output_str(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        let f = SendOutcome::failed(LifecycleDetail::ProviderError, "timeout");
        match f {
            SendOutcome::Failed(ref failure) => {
                assert!(!failure.backoff);
                assert_eq!(failure.detail, LifecycleDetail::ProviderError);
            }
            _ => panic!("expected failure"),
        }

        let b = SendOutcome::failed_backoff(LifecycleDetail::WebhookFilterUnavailable, "down");
        match b {
            SendOutcome::Failed(ref failure) => assert!(failure.backoff),
            _ => panic!("expected failure"),
        }

        assert!(SendOutcome::Success.is_success());
        assert!(!SendOutcome::skipped(LifecycleDetail::FilteredByConditions, "").is_success());
    }

    #[test]
    fn test_bridge_output_lookup() {
        let bridge = BridgeOutput {
            outputs: serde_json::json!({"subject": "Hi", "body": "There"}),
            skip: false,
        };
        assert_eq!(bridge.output_str("subject"), Some("Hi"));
        assert_eq!(bridge.output_str("missing"), None);
    }
}
