//! Herald worker daemon — consumes job deliveries from the queue and
//! executes workflow steps until shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use herald_channels::context::{SendPolicy, SenderServices};
use herald_channels::providers::{default_registry, LoopbackProvider, ProviderRegistry};
use herald_channels::{default_senders, webhook::HttpWebhookNotifier};
use herald_core::audit::ExecutionAudit;
use herald_core::config::HeraldConfig;
use herald_core::traits::{JobQueue, WebhookNotifier};
use herald_core::types::{ChannelKind, Integration, Job, StepType, Subscriber, WorkflowStep};
use herald_engine::runner::RunnerServices;
use herald_engine::{JobRunner, MessageDispatcher, Worker};
use herald_store::{
    ConfigFeatureFlags, IdentityNormalizer, JsonConditionEvaluator, MemoryBackend, MemoryQueue,
    NoFollowerLookup, NoopAnalytics, NoopBridgeExecutor, NoopDigestHandler, NullWebhookNotifier,
    SimpleTemplateCompiler, StaticIntegrationResolver, StaticPreferenceResolver,
};

#[derive(Parser)]
#[command(name = "herald", about = "Notification workflow execution worker")]
struct Args {
    /// Config file path (defaults to ~/.herald/config.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Override worker concurrency.
    #[arg(long)]
    concurrency: Option<usize>,
    /// Outbound webhook endpoint for message lifecycle events.
    #[arg(long)]
    webhook_url: Option<String>,
    /// Seed a demo workflow run against loopback providers and execute it.
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => HeraldConfig::load_from(path)?,
        None => HeraldConfig::load()?,
    };
    if let Some(concurrency) = args.concurrency {
        config.worker.concurrency = concurrency;
    }

    let backend = MemoryBackend::new();
    let queue = Arc::new(MemoryQueue::new());
    let rx = queue.take_receiver();

    let mut registry = default_registry(config.provider.timeout_secs);
    let integrations = if args.demo {
        seed_demo_providers(&mut registry)
    } else {
        Vec::new()
    };

    let webhooks: Arc<dyn WebhookNotifier> = match &args.webhook_url {
        Some(url) => Arc::new(HttpWebhookNotifier::new(url, config.provider.timeout_secs)),
        None => Arc::new(NullWebhookNotifier),
    };

    let audit = ExecutionAudit::new(backend.execution_log.clone());
    let sender_services = Arc::new(SenderServices {
        integrations: Arc::new(StaticIntegrationResolver::new(integrations)),
        compiler: Arc::new(SimpleTemplateCompiler),
        messages: backend.messages.clone(),
        audit: audit.clone(),
        webhooks,
        providers: Arc::new(registry),
        policy: SendPolicy {
            store_content: config.content.store_content,
        },
    });

    let dispatcher = MessageDispatcher::new(
        default_senders(sender_services),
        Arc::new(NoopDigestHandler),
        Arc::new(NoopBridgeExecutor),
        Arc::new(JsonConditionEvaluator),
        Arc::new(StaticPreferenceResolver::allow_all()),
        Arc::new(IdentityNormalizer),
        Arc::new(ConfigFeatureFlags::new(config.features.severity_override)),
        Arc::new(NoopAnalytics),
        audit.clone(),
    );

    let runner = Arc::new(JobRunner::new(
        RunnerServices {
            jobs: backend.jobs.clone(),
            messages: backend.messages.clone(),
            subscribers: backend.subscribers.clone(),
            notifications: backend.notifications.clone(),
            queue: queue.clone(),
            lifecycle: backend.notifications.clone(),
            attachments: backend.attachments.clone(),
            followers: Arc::new(NoFollowerLookup),
            audit,
        },
        dispatcher,
    ));

    if args.demo {
        let first = seed_demo_run(&backend).await;
        queue.enqueue(&first).await?;
        tracing::info!("🚀 Demo run queued");
    }

    let worker = Worker::new(runner, queue.clone(), config.worker.clone());
    tokio::select! {
        _ = worker.run(rx) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

/// Register loopback providers and return matching demo integrations.
fn seed_demo_providers(registry: &mut ProviderRegistry) -> Vec<Integration> {
    registry.register(Arc::new(LoopbackProvider::new("loop_email")));
    registry.register(Arc::new(LoopbackProvider::new("loop_inbox")));
    vec![
        Integration {
            id: "int-demo-email".into(),
            provider_id: "loop_email".into(),
            channel: ChannelKind::Email,
            identifier: None,
            credentials: serde_json::json!({}),
            active: true,
            primary: true,
        },
        Integration {
            id: "int-demo-inbox".into(),
            provider_id: "loop_inbox".into(),
            channel: ChannelKind::InApp,
            identifier: None,
            credentials: serde_json::json!({}),
            active: true,
            primary: true,
        },
    ]
}

/// Seed one EMAIL → DELAY → IN_APP run; returns the first job id.
async fn seed_demo_run(backend: &MemoryBackend) -> String {
    backend.notifications.register("demo-note").await;
    let mut subscriber = Subscriber::new("demo-subscriber");
    subscriber.email = Some("demo@herald.local".into());
    backend.subscribers.upsert("demo-env", subscriber).await;

    let mut email = WorkflowStep::new("demo-email", StepType::Email);
    email.template.subject = Some("Welcome {{payload.name}}".into());
    email.template.body = "Hello {{payload.name}}, your workspace is ready.".into();
    let mut delay = WorkflowStep::new("demo-delay", StepType::Delay);
    delay.delay = Some(herald_core::types::DelaySchedule {
        amount: 1,
        unit: herald_core::types::DelayUnit::Seconds,
    });
    let mut in_app = WorkflowStep::new("demo-inapp", StepType::InApp);
    in_app.template.body = "Workspace ready 🎉".into();

    let mut jobs = Vec::new();
    let mut parent: Option<String> = None;
    for step in [email, delay, in_app] {
        let mut job = Job::new("demo-tx", step, parent.clone());
        job.payload = serde_json::json!({"name": "Demo"});
        job.overrides = serde_json::json!({});
        job.subscriber_id = "demo-subscriber".into();
        job.environment_id = "demo-env".into();
        job.organization_id = "demo-org".into();
        job.workflow_id = "demo-workflow".into();
        job.notification_id = "demo-note".into();
        parent = Some(job.id.clone());
        jobs.push(job);
    }
    let first = jobs[0].id.clone();
    backend.jobs.seed(jobs).await;
    first
}
