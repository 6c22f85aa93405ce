//! In-memory record stores.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use herald_core::error::{HeraldError, Result};
use herald_core::traits::{
    AttachmentStore, ExecutionDetailStore, JobStore, LifecycleAggregator, MessageStore,
    NotificationReader, SubscriberReader,
};
use herald_core::types::{
    Attachment, ChannelKind, DeliveryLifecycle, ExecutionDetail, Job, JobStatus, Message,
    Subscriber,
};

/// Jobs keyed by id.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a pre-linked chain of jobs (test/demo helper).
    pub async fn seed(&self, jobs: Vec<Job>) {
        let mut map = self.jobs.write().await;
        for job in jobs {
            map.insert(job.id.clone(), job);
        }
    }

    pub async fn all(&self) -> Vec<Job> {
        self.jobs.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn insert(&self, job: &Job) -> Result<()> {
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn update_status(&self, id: &str, status: JobStatus) -> Result<()> {
        let mut map = self.jobs.write().await;
        let job = map
            .get_mut(id)
            .ok_or_else(|| HeraldError::Store(format!("job {id} missing on status update")))?;
        job.status = status;
        job.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn set_error(&self, id: &str, error: &str) -> Result<()> {
        let mut map = self.jobs.write().await;
        let job = map
            .get_mut(id)
            .ok_or_else(|| HeraldError::Store(format!("job {id} missing on error update")))?;
        job.error = Some(error.to_string());
        job.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn set_lifecycle(&self, id: &str, lifecycle: DeliveryLifecycle) -> Result<()> {
        let mut map = self.jobs.write().await;
        let job = map
            .get_mut(id)
            .ok_or_else(|| HeraldError::Store(format!("job {id} missing on lifecycle update")))?;
        job.delivery_lifecycle = Some(lifecycle);
        job.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn find_child(&self, id: &str) -> Result<Option<Job>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .find(|j| j.parent_id.as_deref() == Some(id))
            .cloned())
    }

    async fn cancel_pending(
        &self,
        transaction_id: &str,
        subscriber_id: &str,
        workflow_id: &str,
        exclude_id: &str,
    ) -> Result<u64> {
        let mut map = self.jobs.write().await;
        let mut canceled = 0;
        for job in map.values_mut() {
            if job.transaction_id == transaction_id
                && job.subscriber_id == subscriber_id
                && job.workflow_id == workflow_id
                && job.id != exclude_id
                && job.status == JobStatus::Pending
            {
                job.status = JobStatus::Canceled;
                job.updated_at = chrono::Utc::now();
                canceled += 1;
            }
        }
        Ok(canceled)
    }
}

/// Messages keyed by id.
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: RwLock<HashMap<String, Message>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Message> {
        self.messages.read().await.values().cloned().collect()
    }

    pub async fn for_job(&self, job_id: &str) -> Vec<Message> {
        self.messages
            .read()
            .await
            .values()
            .filter(|m| m.job_id == job_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn insert(&self, message: &Message) -> Result<()> {
        self.messages
            .write()
            .await
            .insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn update(&self, message: &Message) -> Result<()> {
        let mut map = self.messages.write().await;
        if !map.contains_key(&message.id) {
            return Err(HeraldError::Store(format!(
                "message {} missing on update",
                message.id
            )));
        }
        map.insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn find_in_app(
        &self,
        notification_id: &str,
        step_id: &str,
        subscriber_id: &str,
    ) -> Result<Option<Message>> {
        Ok(self
            .messages
            .read()
            .await
            .values()
            .find(|m| {
                m.channel == ChannelKind::InApp
                    && m.notification_id == notification_id
                    && m.step_id == step_id
                    && m.subscriber_id == subscriber_id
            })
            .cloned())
    }
}

/// Append-only execution detail log.
#[derive(Default)]
pub struct MemoryExecutionLog {
    entries: RwLock<Vec<ExecutionDetail>>,
}

impl MemoryExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<ExecutionDetail> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl ExecutionDetailStore for MemoryExecutionLog {
    async fn append(&self, detail: &ExecutionDetail) -> Result<()> {
        self.entries.write().await.push(detail.clone());
        Ok(())
    }

    async fn for_job(&self, job_id: &str) -> Result<Vec<ExecutionDetail>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|d| d.job_id == job_id)
            .cloned()
            .collect())
    }
}

/// Notification records plus their lifecycle rollups.
#[derive(Default)]
pub struct MemoryNotificationStore {
    notifications: RwLock<HashMap<String, Option<(DeliveryLifecycle, Option<String>)>>>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, notification_id: &str) {
        self.notifications
            .write()
            .await
            .insert(notification_id.to_string(), None);
    }

    pub async fn lifecycle_of(
        &self,
        notification_id: &str,
    ) -> Option<(DeliveryLifecycle, Option<String>)> {
        self.notifications
            .read()
            .await
            .get(notification_id)
            .cloned()
            .flatten()
    }
}

#[async_trait]
impl NotificationReader for MemoryNotificationStore {
    async fn exists(&self, notification_id: &str) -> Result<bool> {
        Ok(self.notifications.read().await.contains_key(notification_id))
    }
}

#[async_trait]
impl LifecycleAggregator for MemoryNotificationStore {
    async fn update(
        &self,
        notification_id: &str,
        lifecycle: DeliveryLifecycle,
        error: Option<&str>,
    ) -> Result<()> {
        let mut map = self.notifications.write().await;
        match map.get_mut(notification_id) {
            Some(slot) => {
                *slot = Some((lifecycle, error.map(String::from)));
                Ok(())
            }
            None => Err(HeraldError::Store(format!(
                "notification {notification_id} missing on lifecycle update"
            ))),
        }
    }
}

/// Subscribers keyed by (environment, id).
#[derive(Default)]
pub struct MemorySubscriberStore {
    subscribers: RwLock<HashMap<(String, String), Subscriber>>,
}

impl MemorySubscriberStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, environment_id: &str, subscriber: Subscriber) {
        self.subscribers.write().await.insert(
            (environment_id.to_string(), subscriber.id.clone()),
            subscriber,
        );
    }
}

#[async_trait]
impl SubscriberReader for MemorySubscriberStore {
    async fn get(&self, environment_id: &str, subscriber_id: &str) -> Result<Option<Subscriber>> {
        Ok(self
            .subscribers
            .read()
            .await
            .get(&(environment_id.to_string(), subscriber_id.to_string()))
            .cloned())
    }
}

/// Attachment staging with acquire/release accounting, so tests can assert
/// every exit path released its resources.
#[derive(Default)]
pub struct MemoryAttachmentStore {
    staged: RwLock<HashMap<String, Vec<Attachment>>>,
    released: RwLock<Vec<String>>,
}

impl MemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stage(&self, job_id: &str, attachments: Vec<Attachment>) {
        self.staged
            .write()
            .await
            .insert(job_id.to_string(), attachments);
    }

    /// Job ids whose attachments were released, in release order.
    pub async fn released(&self) -> Vec<String> {
        self.released.read().await.clone()
    }
}

#[async_trait]
impl AttachmentStore for MemoryAttachmentStore {
    async fn load(&self, job: &Job) -> Result<Vec<Attachment>> {
        Ok(self
            .staged
            .read()
            .await
            .get(&job.id)
            .cloned()
            .unwrap_or_default())
    }

    async fn release(&self, job: &Job) -> Result<()> {
        self.staged.write().await.remove(&job.id);
        self.released.write().await.push(job.id.clone());
        Ok(())
    }
}

/// Convenience bundle: one of each store, shareable across the engine.
pub struct MemoryBackend {
    pub jobs: Arc<MemoryJobStore>,
    pub messages: Arc<MemoryMessageStore>,
    pub execution_log: Arc<MemoryExecutionLog>,
    pub notifications: Arc<MemoryNotificationStore>,
    pub subscribers: Arc<MemorySubscriberStore>,
    pub attachments: Arc<MemoryAttachmentStore>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(MemoryJobStore::new()),
            messages: Arc::new(MemoryMessageStore::new()),
            execution_log: Arc::new(MemoryExecutionLog::new()),
            notifications: Arc::new(MemoryNotificationStore::new()),
            subscribers: Arc::new(MemorySubscriberStore::new()),
            attachments: Arc::new(MemoryAttachmentStore::new()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::types::{StepType, WorkflowStep};

    fn job_in(tx: &str, status: JobStatus) -> Job {
        let mut job = Job::new(tx, WorkflowStep::new("s", StepType::Email), None);
        job.status = status;
        job.subscriber_id = "sub".into();
        job.workflow_id = "wf".into();
        job
    }

    #[tokio::test]
    async fn test_cancel_pending_scopes_to_transaction() {
        let store = MemoryJobStore::new();
        let running = job_in("tx-1", JobStatus::Running);
        let pending_same = job_in("tx-1", JobStatus::Pending);
        let pending_other = job_in("tx-2", JobStatus::Pending);
        store
            .seed(vec![running.clone(), pending_same.clone(), pending_other.clone()])
            .await;

        let n = store
            .cancel_pending("tx-1", "sub", "wf", &running.id)
            .await
            .unwrap();
        assert_eq!(n, 1);

        let same = store.get(&pending_same.id).await.unwrap().unwrap();
        assert_eq!(same.status, JobStatus::Canceled);
        let other = store.get(&pending_other.id).await.unwrap().unwrap();
        assert_eq!(other.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_find_child_follows_parent_link() {
        let store = MemoryJobStore::new();
        let first = job_in("tx", JobStatus::Completed);
        let mut second = job_in("tx", JobStatus::Pending);
        second.parent_id = Some(first.id.clone());
        store.seed(vec![first.clone(), second.clone()]).await;

        let child = store.find_child(&first.id).await.unwrap().unwrap();
        assert_eq!(child.id, second.id);
        assert!(store.find_child(&second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_update_requires_notification() {
        let store = MemoryNotificationStore::new();
        let err = store
            .update("ghost", DeliveryLifecycle::completed(), None)
            .await;
        assert!(err.is_err());

        store.register("n-1").await;
        store
            .update("n-1", DeliveryLifecycle::completed(), None)
            .await
            .unwrap();
        let (lifecycle, error) = store.lifecycle_of("n-1").await.unwrap();
        assert_eq!(lifecycle, DeliveryLifecycle::completed());
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_attachment_release_accounting() {
        let store = MemoryAttachmentStore::new();
        let job = job_in("tx", JobStatus::Running);
        store
            .stage(
                &job.id,
                vec![Attachment {
                    name: "invoice.pdf".into(),
                    mime: "application/pdf".into(),
                    data: vec![1, 2, 3],
                }],
            )
            .await;

        assert_eq!(store.load(&job).await.unwrap().len(), 1);
        store.release(&job).await.unwrap();
        assert!(store.load(&job).await.unwrap().is_empty());
        assert_eq!(store.released().await, vec![job.id.clone()]);
    }
}
