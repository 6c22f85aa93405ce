//! Custom step sender — the step's work is the user's bridge code, which
//! the dispatcher already ran. Executing the step records its outputs.

use std::sync::Arc;

use async_trait::async_trait;

use herald_core::error::Result;
use herald_core::types::{ChannelKind, DetailStatus, ExecutionDetailKind, SendOutcome};

use crate::context::{SendContext, SenderServices};
use crate::ChannelSender;

pub struct CustomSender {
    services: Arc<SenderServices>,
}

impl CustomSender {
    pub fn new(services: Arc<SenderServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ChannelSender for CustomSender {
    fn channel(&self) -> ChannelKind {
        // Custom steps never deliver through a channel; nominal.
        ChannelKind::InApp
    }

    async fn send(&self, ctx: &SendContext) -> Result<SendOutcome> {
        let raw = ctx
            .bridge
            .as_ref()
            .map(|b| b.outputs.to_string())
            .unwrap_or_else(|| "null".to_string());
        self.services
            .audit
            .record_raw(
                &ctx.job,
                ExecutionDetailKind::StepCompleted,
                DetailStatus::Success,
                raw,
            )
            .await;
        Ok(SendOutcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SendPolicy;
    use crate::providers::ProviderRegistry;
    use herald_core::audit::ExecutionAudit;
    use herald_core::types::{BridgeOutput, Job, Severity, StepType, Subscriber, WorkflowStep};
    use herald_store::{
        MemoryExecutionLog, MemoryMessageStore, NullWebhookNotifier, SimpleTemplateCompiler,
        StaticIntegrationResolver,
    };

    #[tokio::test]
    async fn test_custom_records_bridge_outputs() {
        let log = Arc::new(MemoryExecutionLog::new());
        let services = Arc::new(SenderServices {
            integrations: Arc::new(StaticIntegrationResolver::new(vec![])),
            compiler: Arc::new(SimpleTemplateCompiler),
            messages: Arc::new(MemoryMessageStore::new()),
            audit: ExecutionAudit::new(log.clone()),
            webhooks: Arc::new(NullWebhookNotifier),
            providers: Arc::new(ProviderRegistry::new()),
            policy: SendPolicy::default(),
        });
        let sender = CustomSender::new(services);

        let ctx = SendContext {
            job: Job::new("tx", WorkflowStep::new("s-custom", StepType::Custom), None),
            subscriber: Subscriber::new("sub"),
            variables: serde_json::json!({}),
            bridge: Some(BridgeOutput {
                outputs: serde_json::json!({"score": 7}),
                skip: false,
            }),
            severity: Severity::default(),
            attachments: Vec::new(),
        };

        let outcome = sender.send(&ctx).await.unwrap();
        assert!(outcome.is_success());
        let entries = log.all().await;
        assert!(entries[0].raw.as_deref().unwrap().contains("score"));
    }
}
