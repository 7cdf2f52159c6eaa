//! Runtime pipeline steps and load-time validation.

use std::sync::Arc;

use crate::error::PipelineError;
use crate::models::AgentDefinition;
use crate::pipeline::condition::Condition;
use crate::pipeline::schema::{PipelineStepSpec, RetryLoop};
use crate::pipeline::scheduler::OrchestratorConfig;

/// A step with its agent resolved and its condition parsed.
#[derive(Debug, Clone)]
pub struct PipelineStep {
    pub agent: Arc<AgentDefinition>,
    pub condition: Option<Condition>,
    pub stream_output: bool,
    pub is_revision: bool,
    pub push_prompt_template: Option<String>,
    pub validation_keywords: Option<Vec<String>>,
    pub retry: Option<RetryLoop>,
}

impl PipelineStep {
    pub fn new(agent: impl Into<Arc<AgentDefinition>>) -> Self {
        Self {
            agent: agent.into(),
            condition: None,
            stream_output: false,
            is_revision: false,
            push_prompt_template: None,
            validation_keywords: None,
            retry: None,
        }
    }

    pub fn from_spec(spec: &PipelineStepSpec, agent: Arc<AgentDefinition>) -> Self {
        Self {
            agent,
            condition: spec.condition.as_deref().and_then(Condition::parse),
            stream_output: spec.stream_output,
            is_revision: spec.is_revision,
            push_prompt_template: spec.push_prompt_template.clone(),
            validation_keywords: spec.validation_keywords.clone(),
            retry: spec.retry_loop(),
        }
    }

    /// Attach a condition string. Blank strings clear the condition.
    pub fn with_condition(mut self, condition: &str) -> Self {
        self.condition = Condition::parse(condition);
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

    pub fn retry_from(mut self, from_step: usize, max_iterations: u32) -> Self {
        self.retry = Some(RetryLoop {
            from_step,
            max_iterations,
        });
        self
    }

    pub fn with_push_prompt(mut self, template: impl Into<String>) -> Self {
        self.push_prompt_template = Some(template.into());
        self
    }

    pub fn with_validation_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validation_keywords = Some(keywords.into_iter().map(Into::into).collect());
        self
    }
}

/// Check a step list before running it.
///
/// Backward-pointing retry targets are hard errors. Everything else is a
/// warning, returned to the caller, unless `strict_conditions` is set, in which
/// case condition problems become errors too.
pub fn validate_steps(
    steps: &[PipelineStep],
    config: &OrchestratorConfig,
) -> Result<Vec<String>, PipelineError> {
    let mut warnings = Vec::new();
    let mut problems = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        let label = format!("step {} ({})", index, step.agent.name);

        if let Some(retry) = step.retry {
            if retry.from_step >= index {
                return Err(PipelineError::InvalidDefinition(format!(
                    "{}: retry_from_step {} must point to an earlier step",
                    label, retry.from_step
                )));
            }
            if retry.max_iterations == 0 {
                warnings.push(format!("{}: max_iterations is 0, the retry loop never jumps", label));
            }
            if step.condition.is_none() {
                warnings.push(format!(
                    "{}: retry loop without a condition jumps back on every visit until its budget is spent",
                    label
                ));
            }
        }

        match &step.condition {
            Some(Condition::Unrecognized(raw)) => {
                problems.push(format!("{}: unrecognized condition '{}'", label, raw));
            }
            Some(Condition::OutputContainsAnyKeyword)
                if step.validation_keywords.as_ref().map_or(true, |k| k.is_empty()) =>
            {
                problems.push(format!(
                    "{}: outputContainsAnyKeyword without validation_keywords is always false",
                    label
                ));
            }
            _ => {}
        }

        if step.push_prompt_template.is_some() && !step.is_revision {
            problems.push(format!("{}: push_prompt_template is only used on revision steps", label));
        }
    }

    if config.strict_conditions && !problems.is_empty() {
        return Err(PipelineError::InvalidDefinition(problems.join("; ")));
    }
    warnings.extend(problems);
    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentRole, ModelRef};

    fn step(role: AgentRole) -> PipelineStep {
        PipelineStep::new(AgentDefinition::new(
            role.as_str(),
            role.as_str(),
            role,
            "sys",
            ModelRef::new("m", "local"),
        ))
    }

    #[test]
    fn test_from_spec_parses_condition_and_retry() {
        let spec = PipelineStepSpec {
            retry_from_step: Some(0),
            max_iterations: 2,
            ..PipelineStepSpec::new("judge").when("anyJudgeFoundIssues").streaming()
        };
        let agent = Arc::new(step(AgentRole::LoreJudge).agent.as_ref().clone());
        let runtime = PipelineStep::from_spec(&spec, agent);
        assert_eq!(runtime.condition, Some(Condition::AnyJudgeFoundIssues));
        assert!(runtime.stream_output);
        assert_eq!(
            runtime.retry,
            Some(RetryLoop {
                from_step: 0,
                max_iterations: 2
            })
        );
    }

    #[test]
    fn test_blank_condition_means_none() {
        assert!(step(AgentRole::Custom).with_condition("   ").condition.is_none());
    }

    #[test]
    fn test_retry_must_point_backward() {
        let steps = vec![
            step(AgentRole::ProseWriter),
            step(AgentRole::LoreJudge).retry_from(1, 1),
        ];
        let err = validate_steps(&steps, &OrchestratorConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidDefinition(_)));
        assert!(err.to_string().contains("retry_from_step 1"));

        let ok = vec![
            step(AgentRole::ProseWriter),
            step(AgentRole::LoreJudge)
                .with_condition("previousOutputContains:ISSUE")
                .retry_from(0, 2),
        ];
        assert!(validate_steps(&ok, &OrchestratorConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn test_condition_problems_warn_or_fail() {
        let steps = vec![
            step(AgentRole::ProseWriter).with_condition("wordCont > 10"),
            step(AgentRole::RefusalChecker).with_condition("outputContainsAnyKeyword"),
            step(AgentRole::ProseWriter).with_push_prompt("{{FEEDBACK}}"),
        ];
        let warnings = validate_steps(&steps, &OrchestratorConfig::default()).unwrap();
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("unrecognized condition 'wordCont > 10'"));

        let strict = OrchestratorConfig {
            strict_conditions: true,
            ..Default::default()
        };
        let err = validate_steps(&steps, &strict).unwrap_err();
        assert!(err.to_string().contains("outputContainsAnyKeyword"));
    }

    #[test]
    fn test_empty_pipeline_is_valid() {
        assert!(validate_steps(&[], &OrchestratorConfig::default()).unwrap().is_empty());
    }
}
