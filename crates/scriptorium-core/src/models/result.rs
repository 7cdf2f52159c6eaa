use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::agent::AgentRole;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: MessageRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepMetadata {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_revision: bool,
    /// How many times this step index has executed in the run (1-based).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepMetadata {
    fn is_empty(&self) -> bool {
        !self.is_revision && self.iteration.is_none() && self.error.is_none()
    }
}

/// The record of one executed step. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub role: AgentRole,
    pub agent_name: String,
    pub output: String,
    /// The exact messages sent to the model.
    pub prompt: Vec<PromptMessage>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<StepMetadata>,
}

impl StepResult {
    pub fn new(
        role: AgentRole,
        agent_name: impl Into<String>,
        output: impl Into<String>,
        prompt: Vec<PromptMessage>,
        started_at: DateTime<Utc>,
        duration: Duration,
        metadata: StepMetadata,
    ) -> Self {
        Self {
            role,
            agent_name: agent_name.into(),
            output: output.into(),
            prompt,
            started_at,
            duration_ms: duration.as_millis() as u64,
            metadata: (!metadata.is_empty()).then_some(metadata),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn error(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.error.as_deref())
    }

    pub fn is_revision(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.is_revision)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
    Aborted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunResult {
    pub run_id: Uuid,
    pub steps: Vec<StepResult>,
    /// Raw output of the last recorded step.
    pub final_output: String,
    /// Output of the most recent producer-role step.
    pub primary_output: String,
    pub total_duration_ms: u64,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineRunResult {
    pub fn new(
        run_id: Uuid,
        steps: Vec<StepResult>,
        total_duration: Duration,
        status: RunStatus,
        error: Option<String>,
    ) -> Self {
        let final_output = steps.last().map(|s| s.output.clone()).unwrap_or_default();
        let primary_output = primary_output(&steps).to_string();
        Self {
            run_id,
            steps,
            final_output,
            primary_output,
            total_duration_ms: total_duration.as_millis() as u64,
            status,
            error,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Scan the whole history backward for the latest producer output.
/// Judges or summarizers run afterwards never change it.
pub fn primary_output(results: &[StepResult]) -> &str {
    results
        .iter()
        .rev()
        .find(|r| r.role.is_producer())
        .map(|r| r.output.as_str())
        .unwrap_or("")
}
