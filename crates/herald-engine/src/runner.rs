//! Job orchestrator — executes one job end-to-end and advances the
//! chain.
//!
//! Tolerates at-least-once queue redelivery: loading, status transitions
//! and audit entries are safe to repeat. Unexpected errors are re-thrown
//! after best-effort housekeeping so the queue's own retry accounting
//! takes over; expected failures resolve to job state, audit entries and
//! the run's delivery lifecycle instead.

use std::sync::Arc;

use herald_core::audit::ExecutionAudit;
use herald_core::error::{HeraldError, Result};
use herald_core::traits::{
    AttachmentStore, DigestFollowerLookup, JobQueue, JobStore, LifecycleAggregator, MessageStore,
    NotificationReader, SubscriberReader,
};
use herald_core::types::{
    DeliveryLifecycle, DetailStatus, ExecutionDetailKind, Job, JobStatus, LifecycleDetail,
    SendOutcome, StepType,
};
use herald_channels::SendContext;

use crate::dispatcher::MessageDispatcher;

/// Collaborators of the orchestrator.
pub struct RunnerServices {
    pub jobs: Arc<dyn JobStore>,
    pub messages: Arc<dyn MessageStore>,
    pub subscribers: Arc<dyn SubscriberReader>,
    pub notifications: Arc<dyn NotificationReader>,
    pub queue: Arc<dyn JobQueue>,
    pub lifecycle: Arc<dyn LifecycleAggregator>,
    pub attachments: Arc<dyn AttachmentStore>,
    pub followers: Arc<dyn DigestFollowerLookup>,
    pub audit: ExecutionAudit,
}

pub struct JobRunner {
    services: RunnerServices,
    dispatcher: MessageDispatcher,
}

impl JobRunner {
    pub fn new(services: RunnerServices, dispatcher: MessageDispatcher) -> Self {
        Self {
            services,
            dispatcher,
        }
    }

    /// Execute one queue delivery.
    pub async fn run(&self, job_id: &str) -> Result<()> {
        let s = &self.services;

        // Missing job is a data error, not a transient one.
        let mut job = s
            .jobs
            .get(job_id)
            .await?
            .ok_or_else(|| HeraldError::JobNotFound(job_id.to_string()))?;
        let initial_status = job.status;

        s.audit.step_started(&job).await;
        s.jobs.update_status(&job.id, JobStatus::Running).await?;

        // Canceled digest/delay jobs either terminate here or adopt the
        // still-open follower window and keep executing as it.
        if matches!(job.step_type, StepType::Digest | StepType::Delay)
            && initial_status == JobStatus::Canceled
        {
            match s.followers.active_follower(&job).await? {
                None => {
                    s.audit.step_canceled(&job).await;
                    s.jobs.update_status(&job.id, JobStatus::Canceled).await?;
                    s.jobs
                        .set_lifecycle(
                            &job.id,
                            DeliveryLifecycle::canceled(LifecycleDetail::DigestWindowClosed),
                        )
                        .await?;
                    let _ = s.attachments.release(&job).await;
                    return Ok(());
                }
                Some(follower) => {
                    s.audit
                        .record_raw(
                            &job,
                            ExecutionDetailKind::DigestMergedToFollower,
                            DetailStatus::Success,
                            format!("adopted follower job {}", follower.id),
                        )
                        .await;
                    tracing::info!(
                        canceled = %job.id,
                        follower = %follower.id,
                        "Canceled digest adopted active follower"
                    );
                    job = follower;
                    s.jobs.update_status(&job.id, JobStatus::Running).await?;
                }
            }
        }

        if !s.notifications.exists(&job.notification_id).await? {
            return Err(HeraldError::NotificationNotFound(
                job.notification_id.clone(),
            ));
        }
        let subscriber = s
            .subscribers
            .get(&job.environment_id, &job.subscriber_id)
            .await?
            .ok_or_else(|| HeraldError::SubscriberNotFound(job.subscriber_id.clone()))?;
        let attachments = s.attachments.load(&job).await?;

        // Unsnooze jobs resume a parked in-app message and stop; they do
        // not go through the send/chain flow.
        if job.is_unsnooze() {
            let result = self.resume_snoozed(&job).await;
            let _ = s.attachments.release(&job).await;
            return result;
        }

        let mut ctx = SendContext {
            severity: job.step.severity,
            job: job.clone(),
            subscriber,
            variables: serde_json::Value::Null,
            bridge: None,
            attachments,
        };

        let outcome = match self.dispatcher.dispatch(&mut ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // Unexpected: record what we can, clean up, and re-throw so
                // the queue applies its own retry/backoff accounting.
                s.audit.step_failed(&job, &e.to_string()).await;
                let _ = s.jobs.update_status(&job.id, JobStatus::Failed).await;
                let _ = s.jobs.set_error(&job.id, &e.to_string()).await;
                let _ = s.attachments.release(&job).await;
                return Err(e);
            }
        };

        let mut should_queue_next = true;
        let mut halt_lifecycle = None;

        match &outcome {
            SendOutcome::Success => {
                s.jobs.update_status(&job.id, JobStatus::Completed).await?;
                s.audit.step_completed(&job).await;
            }
            SendOutcome::Failed(failure) => {
                s.jobs.update_status(&job.id, JobStatus::Failed).await?;
                s.jobs.set_error(&job.id, &failure.message).await?;
                s.audit.step_failed(&job, &failure.message).await;

                if failure.backoff {
                    // Transient signature: suppress chaining but leave the
                    // siblings alone so queue redelivery can retry this job.
                    should_queue_next = false;
                    halt_lifecycle = Some(DeliveryLifecycle::failed(failure.detail));
                } else if job.step.halt_on_failure {
                    let canceled = s
                        .jobs
                        .cancel_pending(
                            &job.transaction_id,
                            &job.subscriber_id,
                            &job.workflow_id,
                            &job.id,
                        )
                        .await?;
                    s.audit
                        .record_raw(
                            &job,
                            ExecutionDetailKind::ChainHalted,
                            DetailStatus::Failed,
                            format!("{canceled} pending sibling jobs canceled"),
                        )
                        .await;
                    tracing::warn!(
                        job_id = %job.id,
                        transaction_id = %job.transaction_id,
                        canceled,
                        "Step failed with halt-on-failure, chain stopped"
                    );
                    should_queue_next = false;
                    halt_lifecycle =
                        Some(DeliveryLifecycle::failed(LifecycleDetail::StepFailureHalted));
                }
            }
            SendOutcome::Skipped(skip) => {
                s.jobs.update_status(&job.id, JobStatus::Canceled).await?;
                s.jobs
                    .set_lifecycle(&job.id, DeliveryLifecycle::canceled(skip.detail))
                    .await?;
                s.audit
                    .record_raw(
                        &job,
                        ExecutionDetailKind::StepCanceled,
                        DetailStatus::Warning,
                        skip.message.clone(),
                    )
                    .await;
            }
        }

        if should_queue_next {
            self.advance_chain(&job, &outcome).await?;
        } else {
            let error = match &outcome {
                SendOutcome::Failed(f) => Some(f.message.clone()),
                _ => None,
            };
            if let Some(lifecycle) = halt_lifecycle {
                s.lifecycle
                    .update(&job.notification_id, lifecycle, error.as_deref())
                    .await?;
            }
            let _ = s.attachments.release(&job).await;
        }

        Ok(())
    }

    /// Walk the chain from the executed job: enqueue the next job, or
    /// finish the run. Enqueue failures mark the next job failed and keep
    /// walking (same halt/backoff rules), so the transaction never stalls
    /// silently.
    async fn advance_chain(&self, executed: &Job, outcome: &SendOutcome) -> Result<()> {
        let s = &self.services;
        let mut current = executed.clone();
        let mut enqueue_failed = false;

        loop {
            match s.jobs.find_child(&current.id).await? {
                None => {
                    let (lifecycle, error) = if enqueue_failed {
                        (
                            DeliveryLifecycle::failed(LifecycleDetail::EnqueueFailed),
                            current.error.clone(),
                        )
                    } else {
                        match outcome {
                            SendOutcome::Failed(f) => (
                                DeliveryLifecycle::failed(f.detail),
                                Some(f.message.clone()),
                            ),
                            _ => (DeliveryLifecycle::completed(), None),
                        }
                    };
                    s.lifecycle
                        .update(&executed.notification_id, lifecycle, error.as_deref())
                        .await?;
                    let _ = s.attachments.release(executed).await;
                    tracing::info!(
                        transaction_id = %executed.transaction_id,
                        status = ?lifecycle.status,
                        "Workflow run finished"
                    );
                    return Ok(());
                }
                Some(next) => match s.queue.enqueue(&next.id).await {
                    Ok(()) => {
                        s.jobs.update_status(&next.id, JobStatus::Queued).await?;
                        s.audit
                            .record(&next, ExecutionDetailKind::StepQueued, DetailStatus::Success)
                            .await;
                        let _ = s.attachments.release(executed).await;
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::error!(
                            job_id = %next.id,
                            error = %e,
                            "Failed to enqueue next job"
                        );
                        s.jobs.update_status(&next.id, JobStatus::Failed).await?;
                        s.jobs.set_error(&next.id, &e.to_string()).await?;
                        s.audit
                            .record_raw(
                                &next,
                                ExecutionDetailKind::EnqueueFailed,
                                DetailStatus::Failed,
                                e.to_string(),
                            )
                            .await;
                        let _ = s.attachments.release(&next).await;

                        if e.is_backoff() {
                            s.lifecycle
                                .update(
                                    &executed.notification_id,
                                    DeliveryLifecycle::failed(LifecycleDetail::EnqueueFailed),
                                    Some(&e.to_string()),
                                )
                                .await?;
                            let _ = s.attachments.release(executed).await;
                            return Ok(());
                        }
                        if next.step.halt_on_failure {
                            let canceled = s
                                .jobs
                                .cancel_pending(
                                    &next.transaction_id,
                                    &next.subscriber_id,
                                    &next.workflow_id,
                                    &next.id,
                                )
                                .await?;
                            s.audit
                                .record_raw(
                                    &next,
                                    ExecutionDetailKind::ChainHalted,
                                    DetailStatus::Failed,
                                    format!("{canceled} pending sibling jobs canceled"),
                                )
                                .await;
                            s.lifecycle
                                .update(
                                    &executed.notification_id,
                                    DeliveryLifecycle::failed(LifecycleDetail::EnqueueFailed),
                                    Some(&e.to_string()),
                                )
                                .await?;
                            let _ = s.attachments.release(executed).await;
                            return Ok(());
                        }

                        enqueue_failed = true;
                        let mut failed_next = next;
                        failed_next.error = Some(e.to_string());
                        current = failed_next;
                    }
                },
            }
        }
    }

    /// Resume path for unsnooze jobs: re-open the stored in-app message.
    /// The original chain already advanced when the message was first
    /// delivered, so this job completes without chaining.
    async fn resume_snoozed(&self, job: &Job) -> Result<()> {
        let s = &self.services;
        match s
            .messages
            .find_in_app(&job.notification_id, &job.step.id, &job.subscriber_id)
            .await?
        {
            Some(mut message) => {
                message.reopen();
                s.messages.update(&message).await?;
                s.audit.snooze_resumed(job, &message).await;
                s.jobs.update_status(&job.id, JobStatus::Completed).await?;
                tracing::debug!(job_id = %job.id, message_id = %message.id, "Snoozed message re-delivered");
                Ok(())
            }
            None => {
                let reason = "no snoozed in-app message to resume";
                s.jobs.update_status(&job.id, JobStatus::Failed).await?;
                s.jobs.set_error(&job.id, reason).await?;
                s.audit.step_failed(job, reason).await;
                tracing::warn!(job_id = %job.id, "Unsnooze job found no message");
                Ok(())
            }
        }
    }
}
