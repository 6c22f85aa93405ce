//! Message dispatcher — decides whether a step fires and routes it to
//! the matching channel sender.
//!
//! Everything here runs before any provider call: variable
//! normalization, bridge execution (channel steps only), the two gating
//! checks (conditions and preferences, run concurrently — they share no
//! data), and the severity override. Routing is a lookup table from step
//! type to sender; trigger steps short-circuit and digest steps delegate
//! to the aggregation collaborator.

use std::collections::HashMap;
use std::sync::Arc;

use herald_core::audit::ExecutionAudit;
use herald_core::error::{HeraldError, Result};
use herald_core::traits::{
    AnalyticsTracker, BridgeExecutor, ConditionEvaluator, DigestHandler, FeatureFlags,
    PayloadNormalizer, PreferenceResolver,
};
use herald_core::types::{
    ChannelKind, DetailStatus, ExecutionDetailKind, LifecycleDetail, SendOutcome, Severity,
    StepType,
};
use herald_channels::{ChannelSender, SendContext};

pub struct MessageDispatcher {
    senders: HashMap<StepType, Arc<dyn ChannelSender>>,
    digest: Arc<dyn DigestHandler>,
    bridge: Arc<dyn BridgeExecutor>,
    conditions: Arc<dyn ConditionEvaluator>,
    preferences: Arc<dyn PreferenceResolver>,
    normalizer: Arc<dyn PayloadNormalizer>,
    flags: Arc<dyn FeatureFlags>,
    analytics: Arc<dyn AnalyticsTracker>,
    audit: ExecutionAudit,
}

impl MessageDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        senders: HashMap<StepType, Arc<dyn ChannelSender>>,
        digest: Arc<dyn DigestHandler>,
        bridge: Arc<dyn BridgeExecutor>,
        conditions: Arc<dyn ConditionEvaluator>,
        preferences: Arc<dyn PreferenceResolver>,
        normalizer: Arc<dyn PayloadNormalizer>,
        flags: Arc<dyn FeatureFlags>,
        analytics: Arc<dyn AnalyticsTracker>,
        audit: ExecutionAudit,
    ) -> Self {
        Self {
            senders,
            digest,
            bridge,
            conditions,
            preferences,
            normalizer,
            flags,
            analytics,
            audit,
        }
    }

    /// Evaluate gating and route the step. Never lets a provider error
    /// escape; returns `Err` only for genuinely unexpected failures.
    pub async fn dispatch(&self, ctx: &mut SendContext) -> Result<SendOutcome> {
        // 1. Step-level variable normalization of the compiled payload.
        let normalized = self
            .normalizer
            .normalize(&ctx.job.payload, &ctx.job.step.filters);
        ctx.variables = serde_json::json!({
            "payload": normalized,
            "subscriber": {
                "id": ctx.subscriber.id,
                "email": ctx.subscriber.email,
                "phone": ctx.subscriber.phone,
                "locale": ctx.subscriber.locale,
            },
        });

        // 2. Bridge execution, channel steps only.
        if ctx.job.step_type.is_channel() {
            if let Some(output) = self.bridge.execute(&ctx.job, &ctx.variables).await? {
                if output.skip {
                    return Ok(self
                        .skip(ctx, ExecutionDetailKind::BridgeSkipRequested,
                              LifecycleDetail::BridgeSkipRequested,
                              "bridge code requested skip")
                        .await);
                }
                ctx.bridge = Some(output);
            }
        }

        // 3. Gating: conditions and channel preference are independent,
        // evaluate them concurrently. Conditions take precedence in the
        // reported detail.
        let (verdict, preferences) = tokio::join!(
            self.conditions
                .evaluate(&ctx.job.step.filters, &ctx.variables),
            self.preferences.resolve(
                &ctx.job.subscriber_id,
                &ctx.job.workflow_id,
                ctx.job.tenant.as_deref(),
            ),
        );

        let verdict = match verdict {
            Ok(verdict) => verdict,
            Err(e) if e.is_backoff() => {
                tracing::warn!(job_id = %ctx.job.id, error = %e, "Webhook filter unavailable, deferring to queue retry");
                return Ok(SendOutcome::failed_backoff(
                    LifecycleDetail::WebhookFilterUnavailable,
                    e.to_string(),
                ));
            }
            Err(e) => return Err(e),
        };
        if !verdict.passed {
            let raw = serde_json::to_string(&verdict.conditions).unwrap_or_default();
            self.audit
                .record_raw(
                    &ctx.job,
                    ExecutionDetailKind::FilteredByConditions,
                    DetailStatus::Warning,
                    raw,
                )
                .await;
            self.analytics.track(
                "step_filtered",
                serde_json::json!({
                    "job_id": ctx.job.id,
                    "detail": LifecycleDetail::FilteredByConditions,
                }),
            );
            return Ok(SendOutcome::skipped(
                LifecycleDetail::FilteredByConditions,
                "step conditions did not match",
            ));
        }

        let preferences = preferences?;
        if let Ok(channel) = ChannelKind::try_from(ctx.job.step_type) {
            if !preferences.channel_enabled(channel) {
                return Ok(self
                    .skip(ctx, ExecutionDetailKind::FilteredByPreferences,
                          LifecycleDetail::FilteredByPreferences,
                          "subscriber preference disables this channel")
                    .await);
            }
        }

        // 4. Severity override behind the organization's feature flag.
        ctx.severity = ctx.job.step.severity;
        if let Some(requested) = override_severity(&ctx.job.overrides) {
            if requested != ctx.severity
                && self
                    .flags
                    .severity_override_enabled(&ctx.job.organization_id)
                    .await
            {
                tracing::debug!(
                    job_id = %ctx.job.id,
                    from = ?ctx.severity,
                    to = ?requested,
                    "Severity overridden by trigger"
                );
                ctx.severity = requested;
            }
        }

        // 5. Route by step type.
        match ctx.job.step_type {
            StepType::Trigger => Ok(SendOutcome::Success),
            StepType::Digest => self.digest.handle(&ctx.job).await,
            step_type => {
                let sender = self.senders.get(&step_type).ok_or_else(|| {
                    HeraldError::Channel(format!("no sender registered for {step_type}"))
                })?;
                sender.send(ctx).await
            }
        }
    }

    async fn skip(
        &self,
        ctx: &SendContext,
        kind: ExecutionDetailKind,
        detail: LifecycleDetail,
        reason: &str,
    ) -> SendOutcome {
        self.audit
            .record(&ctx.job, kind, DetailStatus::Warning)
            .await;
        // Reported once, non-blocking, fire-and-forget.
        self.analytics.track(
            "step_filtered",
            serde_json::json!({"job_id": ctx.job.id, "detail": detail}),
        );
        SendOutcome::skipped(detail, reason)
    }
}

fn override_severity(overrides: &serde_json::Value) -> Option<Severity> {
    overrides
        .get("severity")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_severity_parse() {
        assert_eq!(
            override_severity(&serde_json::json!({"severity": "critical"})),
            Some(Severity::Critical)
        );
        assert_eq!(override_severity(&serde_json::json!({})), None);
        assert_eq!(
            override_severity(&serde_json::json!({"severity": "bogus"})),
            None
        );
    }
}
