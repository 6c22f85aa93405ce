//! # Herald Channels
//! Channel sender implementations sharing one send contract.
//!
//! Every sender follows the same shape: resolve an integration, compile
//! content (bridge output wins), create the message record before the
//! provider call, deliver, record audit entries, and return a tri-state
//! outcome. Missing-recipient policy and override merge order are
//! channel-specific and intentional.

pub mod chat;
pub mod context;
pub mod custom;
pub mod delay;
pub mod email;
pub mod in_app;
pub mod providers;
pub mod push;
pub mod sms;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use herald_core::error::Result;
use herald_core::types::{ChannelKind, SendOutcome, StepType};

pub use context::{SendContext, SendPolicy, SenderServices};

/// The shared contract of every channel sender.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> ChannelKind;
    async fn send(&self, ctx: &SendContext) -> Result<SendOutcome>;
}

/// Build the routing table from step type to sender, one entry per
/// deliverable step kind. Trigger and digest steps are routed by the
/// dispatcher itself.
pub fn default_senders(
    services: Arc<SenderServices>,
) -> HashMap<StepType, Arc<dyn ChannelSender>> {
    let mut senders: HashMap<StepType, Arc<dyn ChannelSender>> = HashMap::new();
    senders.insert(
        StepType::Email,
        Arc::new(email::EmailSender::new(services.clone())),
    );
    senders.insert(StepType::Sms, Arc::new(sms::SmsSender::new(services.clone())));
    senders.insert(
        StepType::Push,
        Arc::new(push::PushSender::new(services.clone())),
    );
    senders.insert(
        StepType::Chat,
        Arc::new(chat::ChatSender::new(services.clone())),
    );
    senders.insert(
        StepType::InApp,
        Arc::new(in_app::InAppSender::new(services.clone())),
    );
    senders.insert(
        StepType::Delay,
        Arc::new(delay::DelaySender::new(services.clone())),
    );
    senders.insert(
        StepType::Custom,
        Arc::new(custom::CustomSender::new(services)),
    );
    senders
}
