//! Delay step sender — the parked wait already happened at queue level,
//! so executing the job only records completion and lets the chain move
//! on.

use std::sync::Arc;

use async_trait::async_trait;

use herald_core::error::Result;
use herald_core::types::{ChannelKind, DetailStatus, ExecutionDetailKind, SendOutcome};

use crate::context::{SendContext, SenderServices};
use crate::ChannelSender;

pub struct DelaySender {
    services: Arc<SenderServices>,
}

impl DelaySender {
    pub fn new(services: Arc<SenderServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ChannelSender for DelaySender {
    fn channel(&self) -> ChannelKind {
        // Delay steps never deliver; the channel is nominal.
        ChannelKind::InApp
    }

    async fn send(&self, ctx: &SendContext) -> Result<SendOutcome> {
        self.services
            .audit
            .record(&ctx.job, ExecutionDetailKind::DelayCompleted, DetailStatus::Success)
            .await;
        tracing::debug!(job_id = %ctx.job.id, "Delay completed");
        Ok(SendOutcome::Success)
    }
}
