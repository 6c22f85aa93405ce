//! Collaborator contracts consumed by the execution core.
//!
//! The core owns no persistence, queue transport, template engine or
//! user-code runtime — those capabilities are injected behind the traits
//! below. Adapters live in `herald-store`; tests substitute doubles.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    Attachment, BridgeOutput, ChannelKind, DeliveryLifecycle, ExecutionDetail, FilterVerdict,
    Integration, Job, JobStatus, Message, SendOutcome, StepFilter, Subscriber,
    SubscriberPreferences,
};

/// Job record access. One job is mutated by exactly one execution at a
/// time; `cancel_pending` is the bulk exception and may race with a
/// sibling's own transition (last write wins).
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Job>>;
    async fn insert(&self, job: &Job) -> Result<()>;
    async fn update_status(&self, id: &str, status: JobStatus) -> Result<()>;
    async fn set_error(&self, id: &str, error: &str) -> Result<()>;
    async fn set_lifecycle(&self, id: &str, lifecycle: DeliveryLifecycle) -> Result<()>;
    /// The next step of the chain: the job whose `parent_id` is `id`.
    async fn find_child(&self, id: &str) -> Result<Option<Job>>;
    /// Bulk-cancel all pending jobs of a transaction except `exclude_id`.
    /// Returns how many were canceled.
    async fn cancel_pending(
        &self,
        transaction_id: &str,
        subscriber_id: &str,
        workflow_id: &str,
        exclude_id: &str,
    ) -> Result<u64>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: &Message) -> Result<()>;
    async fn update(&self, message: &Message) -> Result<()>;
    /// Existing in-app message for (notification, step, subscriber), used
    /// for idempotent re-delivery.
    async fn find_in_app(
        &self,
        notification_id: &str,
        step_id: &str,
        subscriber_id: &str,
    ) -> Result<Option<Message>>;
}

/// Append-only audit sink. Implementations must never mutate or delete
/// prior entries.
#[async_trait]
pub trait ExecutionDetailStore: Send + Sync {
    async fn append(&self, detail: &ExecutionDetail) -> Result<()>;
    async fn for_job(&self, job_id: &str) -> Result<Vec<ExecutionDetail>>;
}

/// One queue delivery handed to a worker. `attempt` starts at 1 and
/// increments on each redelivery of the same job id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub job_id: String,
    pub attempt: u32,
}

/// Queue transport. Redelivery/ack mechanics belong to the transport;
/// the core only enqueues and relies on re-invocation after a throw.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job_id: &str) -> Result<()>;
}

/// Lookup parameters for integration resolution.
#[derive(Debug, Clone)]
pub struct IntegrationQuery<'a> {
    pub organization_id: &'a str,
    pub environment_id: &'a str,
    pub channel: ChannelKind,
    /// Narrow to one provider (from overrides).
    pub provider_id: Option<&'a str>,
    /// Narrow to one integration identifier (from overrides).
    pub identifier: Option<&'a str>,
    pub tenant: Option<&'a str>,
}

#[async_trait]
pub trait IntegrationResolver: Send + Sync {
    /// The single integration a non-fan-out channel delivers through.
    async fn resolve(&self, query: &IntegrationQuery<'_>) -> Result<Option<Integration>>;
    /// All active integrations of a channel, for fan-out senders.
    async fn resolve_all(
        &self,
        organization_id: &str,
        environment_id: &str,
        channel: ChannelKind,
        tenant: Option<&str>,
    ) -> Result<Vec<Integration>>;
}

#[async_trait]
pub trait TemplateCompiler: Send + Sync {
    /// Render a template against the compiled variables. Failure is a
    /// terminal content-generation error for the step.
    async fn compile(&self, template: &str, data: &serde_json::Value) -> Result<String>;
}

#[async_trait]
pub trait BridgeExecutor: Send + Sync {
    /// Run user-defined workflow code for a channel step. `None` means no
    /// bridge is registered for the workflow.
    async fn execute(&self, job: &Job, variables: &serde_json::Value)
        -> Result<Option<BridgeOutput>>;
}

#[async_trait]
pub trait PreferenceResolver: Send + Sync {
    async fn resolve(
        &self,
        subscriber_id: &str,
        workflow_id: &str,
        tenant: Option<&str>,
    ) -> Result<SubscriberPreferences>;
}

#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluate a step's filter groups over the compiled variables. A
    /// webhook-backed clause that cannot be reached fails with
    /// `HeraldError::WebhookFilter` — the backoff signature.
    async fn evaluate(
        &self,
        filters: &[StepFilter],
        variables: &serde_json::Value,
    ) -> Result<FilterVerdict>;
}

/// Pure transform applying step-level filter variable rewrites to the
/// compiled payload before gating and send.
pub trait PayloadNormalizer: Send + Sync {
    fn normalize(&self, payload: &serde_json::Value, filters: &[StepFilter]) -> serde_json::Value;
}

/// Outbound webhook event kinds emitted around provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEvent {
    MessageSent,
    MessageFailed,
}

/// Fire-and-forget webhook notifications. Errors are logged by the
/// implementation and never propagated to the caller.
#[async_trait]
pub trait WebhookNotifier: Send + Sync {
    async fn send(&self, event: WebhookEvent, object_type: &str, payload: serde_json::Value);
}

/// Writes the run-level delivery lifecycle rollup onto the notification.
#[async_trait]
pub trait LifecycleAggregator: Send + Sync {
    async fn update(
        &self,
        notification_id: &str,
        lifecycle: DeliveryLifecycle,
        error: Option<&str>,
    ) -> Result<()>;
}

/// Per-organization capability lookup; never read global mutable state.
#[async_trait]
pub trait FeatureFlags: Send + Sync {
    async fn severity_override_enabled(&self, organization_id: &str) -> bool;
}

/// Binary payloads staged for delivery. Acquired before send, released on
/// every exit path to bound storage growth.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn load(&self, job: &Job) -> Result<Vec<Attachment>>;
    async fn release(&self, job: &Job) -> Result<()>;
}

/// Injected stub for the digest-merge algorithm: whether a canceled
/// digest/delay job has a still-open follower window to adopt. The merge
/// decision itself is out of scope for the core.
#[async_trait]
pub trait DigestFollowerLookup: Send + Sync {
    async fn active_follower(&self, job: &Job) -> Result<Option<Job>>;
}

#[async_trait]
pub trait SubscriberReader: Send + Sync {
    async fn get(&self, environment_id: &str, subscriber_id: &str) -> Result<Option<Subscriber>>;
}

/// Parent notification record of a run. A missing record is a fatal data
/// error for the job.
#[async_trait]
pub trait NotificationReader: Send + Sync {
    async fn exists(&self, notification_id: &str) -> Result<bool>;
}

/// Digest aggregation collaborator: decides how a digest step's window is
/// handled. Out of scope here; the dispatcher only routes to it.
#[async_trait]
pub trait DigestHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<SendOutcome>;
}

/// Non-blocking analytics events (skip reporting and the like).
/// Implementations spawn and never block the send path.
pub trait AnalyticsTracker: Send + Sync {
    fn track(&self, event: &str, properties: serde_json::Value);
}
