//! Herald error types.

use thiserror::Error;

/// All errors produced by the execution core.
#[derive(Debug, Error)]
pub enum HeraldError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Queue error: {0}")]
    Queue(String),

    /// The queue delivered an id that no longer resolves to a job. This is
    /// a data error, not a transient condition — the queue must not retry.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The parent notification record of a job is gone. Fatal, same as a
    /// missing job.
    #[error("Notification not found: {0}")]
    NotificationNotFound(String),

    #[error("Subscriber not found: {0}")]
    SubscriberNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Message content not generated: {0}")]
    ContentGeneration(String),

    #[error("Bridge execution failed: {0}")]
    Bridge(String),

    #[error("Condition filter failed: {0}")]
    Filter(String),

    /// A webhook-backed condition filter could not be reached. Treated as
    /// transient: the chain is suppressed but siblings stay untouched so
    /// the queue can redeliver the same job.
    #[error("Webhook filter unavailable: {0}")]
    WebhookFilter(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl HeraldError {
    /// Failure signatures that should suppress chaining without canceling
    /// sibling jobs, relying on queue-level redelivery.
    pub fn is_backoff(&self) -> bool {
        matches!(self, HeraldError::WebhookFilter(_))
    }

    /// Programming/data errors that must surface to the queue as permanent
    /// failures.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HeraldError::JobNotFound(_)
                | HeraldError::NotificationNotFound(_)
                | HeraldError::SubscriberNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, HeraldError>;
