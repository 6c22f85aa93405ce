//! SMS channel sender. Same shape as email with a phone recipient and
//! the `sms` override section.

use std::sync::Arc;

use async_trait::async_trait;

use herald_core::error::Result;
use herald_core::traits::IntegrationQuery;
use herald_core::types::{
    ChannelKind, DetailStatus, ExecutionDetailKind, LifecycleDetail, Message, RecipientTarget,
    SendOutcome,
};

use crate::context::{
    apply_content, compile_content, content_failure, deliver_and_record, MergedOverrides,
    SendContext, SenderServices,
};
use crate::providers::Delivery;
use crate::ChannelSender;

pub struct SmsSender {
    services: Arc<SenderServices>,
}

impl SmsSender {
    pub fn new(services: Arc<SenderServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ChannelSender for SmsSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn send(&self, ctx: &SendContext) -> Result<SendOutcome> {
        let job = &ctx.job;
        let services = &self.services;

        let pre = MergedOverrides::merge(&job.overrides, &job.step.id, &["sms"]);
        let integration = services
            .integrations
            .resolve(&IntegrationQuery {
                organization_id: &job.organization_id,
                environment_id: &job.environment_id,
                channel: ChannelKind::Sms,
                provider_id: pre.get_str("provider_id"),
                identifier: pre.get_str("integration_identifier"),
                tenant: job.tenant.as_deref(),
            })
            .await?;
        let Some(integration) = integration else {
            services
                .audit
                .record(job, ExecutionDetailKind::IntegrationMissing, DetailStatus::Failed)
                .await;
            return Ok(SendOutcome::failed(
                LifecycleDetail::NoActiveIntegration,
                "no active sms integration",
            ));
        };

        let overrides = MergedOverrides::merge(
            &job.overrides,
            &job.step.id,
            &[&integration.provider_id, "sms"],
        );

        let to = overrides
            .get_str("to")
            .map(String::from)
            .or_else(|| ctx.subscriber.phone.clone());
        let Some(to) = to else {
            services
                .audit
                .record(job, ExecutionDetailKind::RecipientMissing, DetailStatus::Warning)
                .await;
            return Ok(SendOutcome::skipped(
                LifecycleDetail::MissingPhoneNumber,
                "subscriber has no phone number",
            ));
        };

        let content = match compile_content(services, ctx, &job.step.template).await {
            Ok(content) => content,
            Err(e) => {
                services
                    .audit
                    .record_raw(
                        job,
                        ExecutionDetailKind::ContentNotGenerated,
                        DetailStatus::Failed,
                        e.to_string(),
                    )
                    .await;
                return Ok(content_failure(e));
            }
        };

        let mut message = Message::for_job(
            job,
            ChannelKind::Sms,
            &integration.provider_id,
            &integration.id,
            RecipientTarget::Phone(to.clone()),
        );
        apply_content(&mut message, &content, ctx.severity, &services.policy);

        let delivery = Delivery {
            recipient: RecipientTarget::Phone(to),
            subject: None,
            title: None,
            body: content.body.clone(),
            credentials: integration.credentials.clone(),
            overrides: overrides.as_value(),
            payload: job.payload.clone(),
            attachments: Vec::new(),
        };

        deliver_and_record(services, job, message, &delivery).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SendPolicy;
    use crate::providers::{LoopbackProvider, ProviderRegistry};
    use herald_core::audit::ExecutionAudit;
    use herald_core::types::{Integration, Job, Severity, StepType, Subscriber, WorkflowStep};
    use herald_store::{
        MemoryExecutionLog, MemoryMessageStore, NullWebhookNotifier, SimpleTemplateCompiler,
        StaticIntegrationResolver,
    };
    use serde_json::json;

    fn sms_services(provider: Arc<LoopbackProvider>) -> (Arc<SenderServices>, Arc<MemoryMessageStore>) {
        let messages = Arc::new(MemoryMessageStore::new());
        let mut registry = ProviderRegistry::new();
        registry.register(provider);
        let services = Arc::new(SenderServices {
            integrations: Arc::new(StaticIntegrationResolver::new(vec![Integration {
                id: "int-sms".into(),
                provider_id: "loop_sms".into(),
                channel: ChannelKind::Sms,
                identifier: None,
                credentials: json!({}),
                active: true,
                primary: true,
            }])),
            compiler: Arc::new(SimpleTemplateCompiler),
            messages: messages.clone(),
            audit: ExecutionAudit::new(Arc::new(MemoryExecutionLog::new())),
            webhooks: Arc::new(NullWebhookNotifier),
            providers: Arc::new(registry),
            policy: SendPolicy::default(),
        });
        (services, messages)
    }

    fn sms_ctx(phone: Option<&str>) -> SendContext {
        let mut step = WorkflowStep::new("step-sms", StepType::Sms);
        step.template.body = "Code: {{payload.code}}".into();
        let mut job = Job::new("tx-1", step, None);
        job.payload = json!({"code": "1234"});
        job.overrides = json!({});
        let mut subscriber = Subscriber::new("sub-1");
        subscriber.phone = phone.map(String::from);
        SendContext {
            variables: json!({"payload": job.payload.clone()}),
            job,
            subscriber,
            bridge: None,
            severity: Severity::default(),
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_sms_success() {
        let provider = Arc::new(LoopbackProvider::new("loop_sms"));
        let (services, messages) = sms_services(provider.clone());
        let sender = SmsSender::new(services);

        let outcome = sender.send(&sms_ctx(Some("+84901234567"))).await.unwrap();
        assert!(outcome.is_success());
        let stored = messages.all().await;
        assert_eq!(stored[0].content.as_deref(), Some("Code: 1234"));
        assert_eq!(
            stored[0].recipient,
            RecipientTarget::Phone("+84901234567".into())
        );
    }

    #[tokio::test]
    async fn test_missing_phone_is_skip() {
        let provider = Arc::new(LoopbackProvider::new("loop_sms"));
        let (services, messages) = sms_services(provider);
        let sender = SmsSender::new(services);

        let outcome = sender.send(&sms_ctx(None)).await.unwrap();
        match outcome {
            SendOutcome::Skipped(s) => {
                assert_eq!(s.detail, LifecycleDetail::MissingPhoneNumber)
            }
            other => panic!("expected skip, got {other:?}"),
        }
        assert!(messages.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_step_override_beats_channel_override() {
        let provider = Arc::new(LoopbackProvider::new("loop_sms"));
        let (services, messages) = sms_services(provider);
        let sender = SmsSender::new(services);

        let mut ctx = sms_ctx(Some("+1000"));
        ctx.job.overrides = json!({
            "sms": {"to": "+2000"},
            "steps": {"step-sms": {"to": "+3000"}}
        });
        sender.send(&ctx).await.unwrap();
        let stored = messages.all().await;
        assert_eq!(stored[0].recipient, RecipientTarget::Phone("+3000".into()));
    }
}
