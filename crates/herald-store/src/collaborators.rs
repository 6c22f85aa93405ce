//! Default collaborator implementations: integration resolution over a
//! static set, a lightweight `{{path}}` template compiler, a JSON
//! condition evaluator, and inert stand-ins for the external systems the
//! core only calls through traits.

use async_trait::async_trait;
use serde_json::Value;

use herald_core::error::{HeraldError, Result};
use herald_core::traits::{
    AnalyticsTracker, BridgeExecutor, ConditionEvaluator, DigestFollowerLookup, DigestHandler,
    FeatureFlags, IntegrationQuery, IntegrationResolver, PayloadNormalizer, PreferenceResolver,
    TemplateCompiler, WebhookEvent, WebhookNotifier,
};
use herald_core::types::{
    BridgeOutput, ChannelKind, EvaluatedCondition, FilterClause, FilterLogic, FilterOperator,
    FilterSource, FilterVerdict, Integration, Job, SendOutcome, StepFilter, SubscriberPreferences,
};

/// Integration resolution over a fixed set of configured integrations.
pub struct StaticIntegrationResolver {
    integrations: Vec<Integration>,
}

impl StaticIntegrationResolver {
    pub fn new(integrations: Vec<Integration>) -> Self {
        Self { integrations }
    }
}

#[async_trait]
impl IntegrationResolver for StaticIntegrationResolver {
    async fn resolve(&self, query: &IntegrationQuery<'_>) -> Result<Option<Integration>> {
        let mut candidates: Vec<&Integration> = self
            .integrations
            .iter()
            .filter(|i| i.active && i.channel == query.channel)
            .filter(|i| match query.provider_id {
                Some(p) => i.provider_id == p,
                None => true,
            })
            .filter(|i| match query.identifier {
                Some(ident) => i.identifier.as_deref() == Some(ident),
                None => true,
            })
            .collect();
        // Primary integration wins over the rest.
        candidates.sort_by_key(|i| !i.primary);
        Ok(candidates.first().map(|i| (*i).clone()))
    }

    async fn resolve_all(
        &self,
        _organization_id: &str,
        _environment_id: &str,
        channel: ChannelKind,
        _tenant: Option<&str>,
    ) -> Result<Vec<Integration>> {
        Ok(self
            .integrations
            .iter()
            .filter(|i| i.active && i.channel == channel)
            .cloned()
            .collect())
    }
}

/// Minimal `{{dot.path}}` interpolation compiler. Real deployments plug a
/// full template engine behind the trait; unresolved paths are a
/// content-generation error so a bad template never sends half-rendered
/// output.
pub struct SimpleTemplateCompiler;

#[async_trait]
impl TemplateCompiler for SimpleTemplateCompiler {
    async fn compile(&self, template: &str, data: &Value) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                HeraldError::ContentGeneration("unterminated {{ placeholder".into())
            })?;
            let path = after[..end].trim();
            let value = lookup_path(data, path).ok_or_else(|| {
                HeraldError::ContentGeneration(format!("unresolved variable: {path}"))
            })?;
            match value {
                Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Condition evaluation over the compiled variables. Webhook-sourced
/// clauses read pre-fetched data under `webhook`; when that data is
/// absent the filter endpoint could not be reached and the evaluation
/// fails with the transient webhook-filter signature.
pub struct JsonConditionEvaluator;

#[async_trait]
impl ConditionEvaluator for JsonConditionEvaluator {
    async fn evaluate(&self, filters: &[StepFilter], variables: &Value) -> Result<FilterVerdict> {
        if filters.is_empty() {
            return Ok(FilterVerdict::passed());
        }

        let mut conditions = Vec::new();
        let mut all_passed = true;
        for group in filters {
            let mut group_results = Vec::new();
            for clause in &group.children {
                let evaluated = evaluate_clause(clause, variables)?;
                group_results.push(evaluated.passed);
                conditions.push(evaluated);
            }
            let group_passed = match group.logic {
                FilterLogic::And => group_results.iter().all(|p| *p),
                FilterLogic::Or => group_results.iter().any(|p| *p),
            };
            if !group_passed {
                all_passed = false;
            }
        }

        Ok(FilterVerdict {
            passed: all_passed,
            conditions,
        })
    }
}

fn evaluate_clause(clause: &FilterClause, variables: &Value) -> Result<EvaluatedCondition> {
    let source = match clause.on {
        FilterSource::Payload => variables.get("payload").unwrap_or(variables),
        FilterSource::Subscriber => variables.get("subscriber").unwrap_or(&Value::Null),
        FilterSource::Webhook => variables.get("webhook").ok_or_else(|| {
            HeraldError::WebhookFilter(format!(
                "no webhook data for filter on '{}' ({})",
                clause.field,
                clause.webhook_url.as_deref().unwrap_or("unset url")
            ))
        })?,
    };

    let actual = lookup_path(source, &clause.field).cloned().unwrap_or(Value::Null);
    let passed = match clause.operator {
        FilterOperator::Equal => actual == clause.value,
        FilterOperator::NotEqual => actual != clause.value,
        FilterOperator::Larger => as_f64(&actual) > as_f64(&clause.value),
        FilterOperator::Smaller => as_f64(&actual) < as_f64(&clause.value),
        FilterOperator::Contains => match (&actual, &clause.value) {
            (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
            (Value::Array(items), needle) => items.contains(needle),
            _ => false,
        },
        FilterOperator::IsDefined => !actual.is_null(),
    };

    Ok(EvaluatedCondition {
        field: clause.field.clone(),
        expected: clause.value.clone(),
        actual,
        passed,
    })
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Fixed preference resolution, useful for stateless runs and tests.
pub struct StaticPreferenceResolver {
    preferences: SubscriberPreferences,
}

impl StaticPreferenceResolver {
    pub fn new(preferences: SubscriberPreferences) -> Self {
        Self { preferences }
    }

    /// Everything enabled.
    pub fn allow_all() -> Self {
        Self::new(SubscriberPreferences::default())
    }
}

#[async_trait]
impl PreferenceResolver for StaticPreferenceResolver {
    async fn resolve(
        &self,
        _subscriber_id: &str,
        _workflow_id: &str,
        _tenant: Option<&str>,
    ) -> Result<SubscriberPreferences> {
        Ok(self.preferences.clone())
    }
}

/// No bridge code registered for any workflow.
pub struct NoopBridgeExecutor;

#[async_trait]
impl BridgeExecutor for NoopBridgeExecutor {
    async fn execute(&self, _job: &Job, _variables: &Value) -> Result<Option<BridgeOutput>> {
        Ok(None)
    }
}

/// Fixed bridge output for every channel step (test double).
pub struct StaticBridgeExecutor {
    output: BridgeOutput,
}

impl StaticBridgeExecutor {
    pub fn new(output: BridgeOutput) -> Self {
        Self { output }
    }

    pub fn skipping() -> Self {
        Self::new(BridgeOutput {
            outputs: Value::Null,
            skip: true,
        })
    }
}

#[async_trait]
impl BridgeExecutor for StaticBridgeExecutor {
    async fn execute(&self, _job: &Job, _variables: &Value) -> Result<Option<BridgeOutput>> {
        Ok(Some(self.output.clone()))
    }
}

/// Pass-through normalizer: payloads are already compiled upstream.
pub struct IdentityNormalizer;

impl PayloadNormalizer for IdentityNormalizer {
    fn normalize(&self, payload: &Value, _filters: &[StepFilter]) -> Value {
        payload.clone()
    }
}

/// Feature flags from static configuration, same answer for every
/// organization.
pub struct ConfigFeatureFlags {
    severity_override: bool,
}

impl ConfigFeatureFlags {
    pub fn new(severity_override: bool) -> Self {
        Self { severity_override }
    }
}

#[async_trait]
impl FeatureFlags for ConfigFeatureFlags {
    async fn severity_override_enabled(&self, _organization_id: &str) -> bool {
        self.severity_override
    }
}

/// No open digest windows: canceled digest jobs simply terminate.
pub struct NoFollowerLookup;

#[async_trait]
impl DigestFollowerLookup for NoFollowerLookup {
    async fn active_follower(&self, _job: &Job) -> Result<Option<Job>> {
        Ok(None)
    }
}

/// Digest aggregation stand-in: acknowledges the window and moves on.
pub struct NoopDigestHandler;

#[async_trait]
impl DigestHandler for NoopDigestHandler {
    async fn handle(&self, job: &Job) -> Result<SendOutcome> {
        tracing::debug!(job_id = %job.id, "Digest step delegated to aggregation");
        Ok(SendOutcome::Success)
    }
}

/// Webhook notifier that only logs. The HTTP implementation lives in
/// `herald-channels`.
pub struct NullWebhookNotifier;

#[async_trait]
impl WebhookNotifier for NullWebhookNotifier {
    async fn send(&self, event: WebhookEvent, object_type: &str, _payload: Value) {
        tracing::trace!(?event, object_type, "Webhook notification suppressed");
    }
}

/// Analytics sink that drops everything.
pub struct NoopAnalytics;

impl AnalyticsTracker for NoopAnalytics {
    fn track(&self, event: &str, _properties: Value) {
        tracing::trace!(event, "Analytics event dropped");
    }
}
