//! YAML schema types for pipeline presets.
//!
//! A pipeline preset lists agents by id, in execution order:
//!
//! ```yaml
//! id: "quality-prose-with-revision"
//! name: "Quality Prose with Revision"
//! description: "Write, check lore, and revise when the judge finds issues"
//!
//! steps:
//!   - agent: "system-summarizer"
//!     condition: "wordCount > 3000"
//!   - agent: "system-prose-writer"
//!     stream_output: true
//!   - agent: "system-lore-judge"
//!   - agent: "system-prose-writer"
//!     condition: "roleOutputContains:lore_judge:ISSUE"
//!     is_revision: true
//!     stream_output: true
//! ```
//!
//! A step may loop back to an earlier step while its condition holds:
//!
//! ```yaml
//!   - agent: "system-refusal-checker"
//!     condition: "outputContainsAnyKeyword"
//!     validation_keywords: ["I can't", "I cannot"]
//!     retry_from_step: 1
//!     max_iterations: 2
//! ```

use serde::{Deserialize, Serialize};

/// A single step of a pipeline preset, before its agent is resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineStepSpec {
    /// Agent id, resolved through the preset store
    pub agent: String,

    /// Only run this step when the condition holds (see `pipeline::condition`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Forward fragments to the token callback as they arrive
    #[serde(default)]
    pub stream_output: bool,

    /// Build a revision prompt from the latest prose and judge feedback
    #[serde(default)]
    pub is_revision: bool,

    /// Revision follow-up with `{{PREVIOUS_OUTPUT}}` / `{{FEEDBACK}}` placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_prompt_template: Option<String>,

    /// Keywords for the `outputContainsAnyKeyword` condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_keywords: Option<Vec<String>>,

    /// Zero-based index to jump back to while the condition holds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_from_step: Option<usize>,

    /// How many backward jumps this step may trigger in one run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_max_iterations() -> u32 {
    1
}

impl PipelineStepSpec {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            condition: None,
            stream_output: false,
            is_revision: false,
            push_prompt_template: None,
            validation_keywords: None,
            retry_from_step: None,
            max_iterations: default_max_iterations(),
        }
    }

    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream_output = true;
        self
    }

    pub fn revision(mut self) -> Self {
        self.is_revision = true;
        self
    }

    pub fn retry_loop(&self) -> Option<RetryLoop> {
        self.retry_from_step.map(|from_step| RetryLoop {
            from_step,
            max_iterations: self.max_iterations,
        })
    }
}

/// "Go back to `from_step` while my condition holds, at most
/// `max_iterations` times per run."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryLoop {
    pub from_step: usize,
    pub max_iterations: u32,
}

/// Top-level pipeline preset loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelinePreset {
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Ordered list of steps, addressed by zero-based index
    pub steps: Vec<PipelineStepSpec>,
}

impl PipelinePreset {
    /// Parse a pipeline preset from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        serde_yaml::from_str(yaml).map_err(|e| format!("Failed to parse pipeline YAML: {}", e))
    }

    /// Load a pipeline preset from a file path.
    pub fn from_file(path: &str) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read pipeline file '{}': {}", path, e))?;
        Self::from_yaml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_pipeline() {
        let yaml = r#"
id: "quick"
name: "Quick Draft"
steps:
  - agent: "system-prose-writer"
"#;
        let preset = PipelinePreset::from_yaml(yaml).unwrap();
        assert_eq!(preset.name, "Quick Draft");
        assert_eq!(preset.steps.len(), 1);
        let step = &preset.steps[0];
        assert!(!step.stream_output);
        assert_eq!(step.max_iterations, 1);
        assert!(step.retry_loop().is_none());
    }

    #[test]
    fn test_parse_full_pipeline() {
        let yaml = r#"
id: "guarded"
name: "Guarded Draft"
description: "Redraft when the model refuses"
steps:
  - agent: "system-summarizer"
    condition: "wordCount > 3000"
  - agent: "system-prose-writer"
    stream_output: true
  - agent: "refusal-checker"
    condition: "outputContainsAnyKeyword"
    validation_keywords: ["I can't", "as an AI"]
    retry_from_step: 1
    max_iterations: 3
  - agent: "system-prose-writer"
    is_revision: true
    push_prompt_template: "FEEDBACK:\n{{FEEDBACK}}"
"#;
        let preset = PipelinePreset::from_yaml(yaml).unwrap();
        assert_eq!(preset.steps.len(), 4);
        assert_eq!(preset.steps[0].condition.as_deref(), Some("wordCount > 3000"));
        assert!(preset.steps[1].stream_output);
        assert_eq!(
            preset.steps[2].retry_loop(),
            Some(RetryLoop {
                from_step: 1,
                max_iterations: 3
            })
        );
        assert_eq!(preset.steps[2].validation_keywords.as_ref().unwrap().len(), 2);
        assert!(preset.steps[3].is_revision);
        assert!(preset.steps[3].push_prompt_template.is_some());
    }

    #[test]
    fn test_missing_steps_is_an_error() {
        let err = PipelinePreset::from_yaml("id: x\nname: X\n").unwrap_err();
        assert!(err.contains("Failed to parse pipeline YAML"));
    }
}
