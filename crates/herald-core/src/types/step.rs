//! Workflow step definitions — what a job executes.

use serde::{Deserialize, Serialize};

/// Kind of workflow step. Closed set: routing tables key off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Trigger,
    Email,
    Sms,
    Push,
    Chat,
    InApp,
    Digest,
    Delay,
    Custom,
}

impl StepType {
    /// Channel steps run user bridge code and deliver (or skip) a message.
    /// Trigger/digest/delay are control steps.
    pub fn is_channel(&self) -> bool {
        matches!(
            self,
            StepType::Email
                | StepType::Sms
                | StepType::Push
                | StepType::Chat
                | StepType::InApp
                | StepType::Custom
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Trigger => "trigger",
            StepType::Email => "email",
            StepType::Sms => "sms",
            StepType::Push => "push",
            StepType::Chat => "chat",
            StepType::InApp => "in_app",
            StepType::Digest => "digest",
            StepType::Delay => "delay",
            StepType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of a workflow definition, denormalized onto every job so a
/// worker never has to load the workflow itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step id within the workflow (stable across runs).
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub step_type: StepType,
    #[serde(default = "default_true")]
    pub active: bool,
    /// When this step fails with a non-backoff error, cancel all other
    /// pending jobs of the same transaction.
    #[serde(default)]
    pub halt_on_failure: bool,
    /// Condition groups gating whether the step fires.
    #[serde(default)]
    pub filters: Vec<StepFilter>,
    #[serde(default)]
    pub template: StepTemplate,
    /// Delay metadata, present on delay steps and snooze-capable in-app
    /// steps.
    #[serde(default)]
    pub delay: Option<DelaySchedule>,
    /// Severity inherited from the workflow; trigger overrides may change
    /// it when the organization's feature flag allows.
    #[serde(default)]
    pub severity: super::message::Severity,
}

fn default_true() -> bool {
    true
}

impl WorkflowStep {
    pub fn new(id: &str, step_type: StepType) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            step_type,
            active: true,
            halt_on_failure: false,
            filters: Vec::new(),
            template: StepTemplate::default(),
            delay: None,
            severity: super::message::Severity::default(),
        }
    }
}

/// Raw (uncompiled) message content of a step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepTemplate {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: String,
}

/// How long a delay/snooze step parks the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelaySchedule {
    pub amount: u32,
    pub unit: DelayUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

/// A group of conditions combined with one logical operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFilter {
    #[serde(default)]
    pub logic: FilterLogic,
    pub children: Vec<FilterClause>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterLogic {
    #[default]
    And,
    Or,
}

/// One leaf condition over the compiled variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterClause {
    /// Where the left-hand value comes from.
    pub on: FilterSource,
    /// Dot-separated path into the source object.
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: serde_json::Value,
    /// Endpoint queried for `FilterSource::Webhook` clauses.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterSource {
    Payload,
    Subscriber,
    Webhook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equal,
    NotEqual,
    Larger,
    Smaller,
    Contains,
    IsDefined,
}
