//! System presets that ship with the engine. Always available; file presets
//! with the same id replace them.

use crate::models::{AgentDefinition, AgentRole, ModelRef};
use crate::pipeline::schema::{PipelinePreset, PipelineStepSpec};

pub const SUMMARIZER: &str = "system-summarizer";
pub const PROSE_WRITER: &str = "system-prose-writer";
pub const LORE_JUDGE: &str = "system-lore-judge";
pub const CONTINUITY_CHECKER: &str = "system-continuity-checker";
pub const STYLE_EDITOR: &str = "system-style-editor";
pub const DIALOGUE_SPECIALIST: &str = "system-dialogue-specialist";

/// Cheap model for summaries and checks.
fn utility_model() -> ModelRef {
    ModelRef {
        name: Some("GLM-4 Flash".to_string()),
        ..ModelRef::new("z-ai/glm-4-flash", "openrouter")
    }
}

/// Main creative model.
fn creative_model() -> ModelRef {
    ModelRef {
        name: Some("DeepSeek V3 0324".to_string()),
        ..ModelRef::new("deepseek/deepseek-chat-v3-0324", "openrouter")
    }
}

#[allow(clippy::too_many_arguments)]
fn agent(
    id: &str,
    name: &str,
    description: &str,
    role: AgentRole,
    model: ModelRef,
    temperature: f32,
    max_tokens: u32,
    system_prompt: &str,
) -> AgentDefinition {
    AgentDefinition {
        description: Some(description.to_string()),
        ..AgentDefinition::new(id, name, role, system_prompt, model).with_sampling(temperature, max_tokens)
    }
}

pub fn builtin_agents() -> Vec<AgentDefinition> {
    vec![
        agent(
            SUMMARIZER,
            "System Summarizer",
            "Condenses story text while keeping the narrative details that matter.",
            AgentRole::Summarizer,
            utility_model(),
            0.3,
            2000,
            "You summarize fiction. Keep, in chronological order:\n\
             - the plot events\n\
             - what characters feel and want, and how they relate\n\
             - dialogue that matters, with its context\n\
             - setting and atmosphere\n\
             - foreshadowing and subtext\n\n\
             Aim for roughly a fifth of the original length without dropping any story beat.",
        ),
        agent(
            PROSE_WRITER,
            "System Prose Writer",
            "Main creative agent; continues the story from a scene beat.",
            AgentRole::ProseWriter,
            creative_model(),
            0.85,
            2048,
            "You are a fiction writer continuing a story from its context and a scene beat.\n\n\
             - Keep tone, style and narrative voice consistent.\n\
             - Show through action and sensory detail rather than telling.\n\
             - Give each character an authentic voice.\n\
             - Balance dialogue, action and reflection; pace transitions naturally.\n\
             - Respect established world-building and lore.",
        ),
        agent(
            LORE_JUDGE,
            "System Lore Judge",
            "Checks generated prose against lorebook data.",
            AgentRole::LoreJudge,
            utility_model(),
            0.2,
            800,
            "You check prose against a lorebook. Look for contradictions in character names and \
             traits, places, timeline, world rules and relationships.\n\n\
             If nothing contradicts the lore, reply with exactly: CONSISTENT\n\
             Otherwise list each problem as:\n\
             ISSUE: <what is inconsistent>\n\
             SUGGESTION: <how to fix it>\n\n\
             Report contradictions only, not style preferences.",
        ),
        agent(
            CONTINUITY_CHECKER,
            "System Continuity Checker",
            "Looks for plot holes and character inconsistencies.",
            AgentRole::ContinuityChecker,
            utility_model(),
            0.2,
            600,
            "You check narrative continuity: event order, characters acting against established \
             patterns, dropped plot threads, physical impossibilities and emotional reactions that \
             ignore earlier scenes.\n\n\
             If the new prose is consistent, reply with exactly: CONSISTENT\n\
             Otherwise, for each problem:\n\
             CONTINUITY ISSUE: <description>\n\
             CONTEXT: <what was established earlier>\n\
             SUGGESTION: <how to resolve it>",
        ),
        agent(
            STYLE_EDITOR,
            "System Style Editor",
            "Polishes prose for style, flow and readability.",
            AgentRole::StyleEditor,
            creative_model(),
            0.6,
            2048,
            "You edit prose for style and flow while keeping the author's voice. Vary sentence \
             rhythm, sharpen word choice, smooth transitions, cut redundancy and strengthen \
             imagery. Keep meaning, plot and character voice intact. Output only the edited text.",
        ),
        agent(
            DIALOGUE_SPECIALIST,
            "System Dialogue Specialist",
            "Makes dialogue sound natural and gives characters distinct voices.",
            AgentRole::DialogueSpecialist,
            creative_model(),
            0.7,
            2048,
            "You improve fictional dialogue. Give every character a recognisable way of speaking, \
             allow interruptions and pauses, lean on subtext, and vary or drop dialogue tags in \
             favour of action beats. Keep plot points and relationships as they are. Output only \
             the improved text.",
        ),
    ]
}

fn pipeline(id: &str, name: &str, description: &str, steps: Vec<PipelineStepSpec>) -> PipelinePreset {
    PipelinePreset {
        id: id.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        steps,
    }
}

pub fn builtin_pipelines() -> Vec<PipelinePreset> {
    let summarize = || PipelineStepSpec::new(SUMMARIZER).when("wordCount > 3000");

    vec![
        pipeline(
            "quality-prose-with-lore-check",
            "Quality Prose with Lore Check",
            "Writes prose and validates it against the lorebook. Streams the prose.",
            vec![
                summarize(),
                PipelineStepSpec::new(PROSE_WRITER).streaming(),
                PipelineStepSpec::new(LORE_JUDGE),
            ],
        ),
        pipeline(
            "quality-prose-with-revision",
            "Quality Prose with Revision",
            "Writes prose, checks lore, and revises when the judge reports issues.",
            vec![
                summarize(),
                PipelineStepSpec::new(PROSE_WRITER).streaming(),
                PipelineStepSpec::new(LORE_JUDGE),
                PipelineStepSpec::new(PROSE_WRITER)
                    .when("roleOutputContains:lore_judge:ISSUE")
                    .revision()
                    .streaming(),
            ],
        ),
        pipeline(
            "polished-output",
            "Polished Output",
            "Writes prose, then polishes it for style.",
            vec![
                PipelineStepSpec::new(PROSE_WRITER),
                PipelineStepSpec::new(STYLE_EDITOR).streaming(),
            ],
        ),
        pipeline(
            "full-quality-pipeline",
            "Full Quality Pipeline",
            "Summarize, write, check lore and continuity, and revise when needed.",
            vec![
                summarize(),
                PipelineStepSpec::new(PROSE_WRITER).streaming(),
                PipelineStepSpec::new(LORE_JUDGE),
                PipelineStepSpec::new(CONTINUITY_CHECKER),
                PipelineStepSpec::new(PROSE_WRITER)
                    .when("previousOutputContains:ISSUE")
                    .revision()
                    .streaming(),
            ],
        ),
        pipeline(
            "quick-draft",
            "Quick Draft",
            "A single streamed prose pass.",
            vec![PipelineStepSpec::new(PROSE_WRITER).streaming()],
        ),
        pipeline(
            "dialogue-polish",
            "Dialogue Polish",
            "Writes prose, then reworks its dialogue.",
            vec![
                PipelineStepSpec::new(PROSE_WRITER),
                PipelineStepSpec::new(DIALOGUE_SPECIALIST).streaming(),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_agents() {
        let agents = builtin_agents();
        assert_eq!(agents.len(), 6);
        let judge = agents.iter().find(|a| a.id == LORE_JUDGE).unwrap();
        assert_eq!(judge.role, AgentRole::LoreJudge);
        assert_eq!(judge.max_tokens, 800);
        assert!(judge.system_prompt.contains("CONSISTENT"));
    }

    #[test]
    fn test_builtin_pipelines_reference_builtin_agents() {
        let agent_ids: Vec<String> = builtin_agents().into_iter().map(|a| a.id).collect();
        let pipelines = builtin_pipelines();
        assert_eq!(pipelines.len(), 6);
        for p in &pipelines {
            for step in &p.steps {
                assert!(agent_ids.contains(&step.agent), "{} references {}", p.id, step.agent);
            }
        }
        let revision = pipelines
            .iter()
            .find(|p| p.id == "quality-prose-with-revision")
            .unwrap();
        assert!(revision.steps[3].is_revision);
    }
}
