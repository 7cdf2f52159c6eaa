//! Context assembly: turn an agent, the run input and the results so far into
//! the message list sent to the model.
//!
//! Every role has its own [`MessageBuilder`], picked through [`builder_for`].
//! Builders never read the input directly for knowledge entries or previous
//! text; they go through [`MessageContext`], which applies the agent's
//! resolved [`EffectiveContext`].
//!
//! Revision steps of producer roles get a rewrite request carrying the latest
//! prose and the judges' feedback. When the step has a push prompt, the
//! request is replayed as a conversation instead:
//!
//! ```text
//! system     agent instruction
//! user       the original (non-revision) request
//! assistant  the latest prose
//! user       push template with {{PREVIOUS_OUTPUT}} / {{FEEDBACK}} filled in
//! ```

use crate::models::{
    primary_output, AgentDefinition, AgentRole, ContextConfig, EffectiveContext, KnowledgeEntry,
    LorebookMode, PipelineInput, PreviousTextMode, PromptMessage, StepResult,
};
use crate::pipeline::scheduler::OrchestratorConfig;
use crate::pipeline::step::PipelineStep;
use crate::text::{excerpt, tail_chars};

pub const PREVIOUS_OUTPUT_PLACEHOLDER: &str = "{{PREVIOUS_OUTPUT}}";
pub const FEEDBACK_PLACEHOLDER: &str = "{{FEEDBACK}}";

/// Lore descriptions in prose prompts are cut to this many characters.
const LORE_EXCERPT_CHARS: usize = 200;

/// Read-only view of everything a builder may draw from.
pub struct MessageContext<'a> {
    pub agent: &'a AgentDefinition,
    pub input: &'a PipelineInput,
    pub history: &'a [StepResult],
    pub step: &'a PipelineStep,
    pub policy: EffectiveContext,
    default_previous_text_limit: usize,
}

impl<'a> MessageContext<'a> {
    pub fn new(
        agent: &'a AgentDefinition,
        input: &'a PipelineInput,
        history: &'a [StepResult],
        step: &'a PipelineStep,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            agent,
            input,
            history,
            step,
            policy: ContextConfig::resolve(agent.context.as_ref(), agent.role),
            default_previous_text_limit: config.default_previous_text_limit,
        }
    }

    /// Knowledge entries selected by the lorebook mode.
    pub fn lorebook_entries(&self) -> Vec<&'a KnowledgeEntry> {
        let limit = self.policy.lorebook_limit.unwrap_or(usize::MAX);
        match self.policy.lorebook_mode {
            LorebookMode::None => Vec::new(),
            LorebookMode::Matched => self.input.matched_entries.iter().collect(),
            LorebookMode::All => self.input.all_entries.iter().take(limit).collect(),
            LorebookMode::Custom => self
                .input
                .all_entries
                .iter()
                .filter(|e| self.policy.custom_entry_ids.contains(&e.id))
                .take(limit)
                .collect(),
        }
    }

    /// Previous narrative text selected by the previous-text mode.
    pub fn previous_text(&self) -> &'a str {
        let text = self.input.previous_text.as_str();
        match self.policy.previous_text_mode {
            PreviousTextMode::None => "",
            PreviousTextMode::Full => text,
            PreviousTextMode::Limited => tail_chars(text, self.previous_text_limit()),
            PreviousTextMode::Summarized => self
                .history
                .iter()
                .rev()
                .find(|r| r.role == AgentRole::Summarizer)
                .map(|r| r.output.as_str())
                .unwrap_or_else(|| tail_chars(text, self.previous_text_limit())),
        }
    }

    fn previous_text_limit(&self) -> usize {
        self.policy
            .previous_text_limit
            .unwrap_or(self.default_previous_text_limit)
    }

    /// "POV: Third Person Limited (Mara)", when configured and known.
    pub fn pov_line(&self) -> Option<String> {
        if !self.policy.include_pov_info {
            return None;
        }
        let pov = self.input.pov.as_ref()?;
        let pov_type = pov.pov_type.as_deref().filter(|t| !t.is_empty())?;
        Some(match pov.character.as_deref().filter(|c| !c.is_empty()) {
            Some(character) => format!("POV: {} ({})", pov_type, character),
            None => format!("POV: {}", pov_type),
        })
    }

    pub fn chapter_summary(&self) -> Option<&'a str> {
        if !self.policy.include_chapter_summary {
            return None;
        }
        self.input
            .chapter_summary
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    /// The most recent producer output so far.
    pub fn latest_prose(&self) -> &'a str {
        primary_output(self.history)
    }

    pub fn last_output(&self) -> &'a str {
        self.history.last().map(|r| r.output.as_str()).unwrap_or("")
    }

    /// Judge results after the latest producer result, or every judge result
    /// when none follow it.
    pub fn feedback(&self) -> String {
        let after_prose = self
            .history
            .iter()
            .rposition(|r| r.role.is_producer())
            .map(|pos| &self.history[pos + 1..])
            .unwrap_or(self.history);

        let recent: Vec<&StepResult> = after_prose.iter().filter(|r| r.role.is_judge()).collect();
        let judges = if recent.is_empty() {
            self.history.iter().filter(|r| r.role.is_judge()).collect()
        } else {
            recent
        };

        judges
            .iter()
            .map(|r| format!("[{} FEEDBACK]:\n{}", r.role.as_str().to_uppercase(), r.output))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Lore, POV, chapter summary and story context, in that order.
    fn context_sections(&self, lore_heading: &str) -> String {
        let mut out = String::new();

        let lore = lore_bullets(&self.lorebook_entries());
        if !lore.is_empty() {
            out.push_str(&format!("{}:\n{}\n\n", lore_heading, lore));
        }
        if let Some(pov) = self.pov_line() {
            out.push_str(&pov);
            out.push_str("\n\n");
        }
        if let Some(summary) = self.chapter_summary() {
            out.push_str(&format!("CHAPTER SUMMARY:\n{}\n\n", summary));
        }
        let previous = self.previous_text();
        if !previous.is_empty() {
            out.push_str(&format!("STORY CONTEXT:\n{}\n\n", previous));
        }
        out
    }
}

fn lore_bullets(entries: &[&KnowledgeEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("• {}: {}", e.name, excerpt(&e.description, LORE_EXCERPT_CHARS)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn lore_records(entries: &[&KnowledgeEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("[{}] {}:\n{}", e.category.to_uppercase(), e.name, e.description))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn or_placeholder(text: &str) -> &str {
    if text.trim().is_empty() {
        "(none)"
    } else {
        text
    }
}

/// Builds the user-side prompt for one role.
pub trait MessageBuilder: Send + Sync {
    /// The normal request for this role.
    fn compose(&self, ctx: &MessageContext<'_>) -> String;

    /// The request on a revision step. Non-producer roles ignore the flag.
    fn revise(&self, ctx: &MessageContext<'_>) -> String {
        self.compose(ctx)
    }
}

/// Shared rewrite request used by every producer role.
fn revision_request(ctx: &MessageContext<'_>) -> String {
    let mut msg = String::from("You need to REVISE the following prose based on the feedback provided.\n\n");

    let lore = lore_bullets(&ctx.lorebook_entries());
    if !lore.is_empty() {
        msg.push_str(&format!("RELEVANT LORE (for reference):\n{}\n\n", lore));
    }
    msg.push_str(&format!("ORIGINAL SCENE BEAT INSTRUCTION:\n{}\n\n", ctx.input.instruction));
    msg.push_str(&format!("---\nORIGINAL PROSE:\n{}\n\n", ctx.latest_prose()));

    let feedback = ctx.feedback();
    if !feedback.is_empty() {
        msg.push_str(&format!("---\n{}\n\n", feedback));
    }
    msg.push_str(
        "---\nPlease rewrite the prose, addressing ALL the issues mentioned in the feedback \
         while maintaining the original intent and style. Output ONLY the revised prose:",
    );
    msg
}

pub struct SummarizerMessages;
pub struct ProseWriterMessages;
pub struct LoreJudgeMessages;
pub struct ContinuityCheckerMessages;
pub struct RefusalCheckerMessages;
pub struct StyleEditorMessages;
pub struct DialogueSpecialistMessages;
pub struct ExpanderMessages;
pub struct OutlineGeneratorMessages;
pub struct StyleExtractorMessages;
pub struct ScenebeatGeneratorMessages;
pub struct CustomMessages;

impl MessageBuilder for SummarizerMessages {
    fn compose(&self, ctx: &MessageContext<'_>) -> String {
        format!(
            "Summarize the following text while preserving key narrative details, character \
             emotions, and plot points. Reduce to approximately 1000 words:\n\n{}",
            ctx.previous_text()
        )
    }
}

impl MessageBuilder for ProseWriterMessages {
    fn compose(&self, ctx: &MessageContext<'_>) -> String {
        format!(
            "{}---\nSCENE BEAT INSTRUCTION:\n{}\n\nContinue the story:",
            ctx.context_sections("RELEVANT LORE"),
            ctx.input.instruction
        )
    }

    fn revise(&self, ctx: &MessageContext<'_>) -> String {
        revision_request(ctx)
    }
}

impl MessageBuilder for LoreJudgeMessages {
    fn compose(&self, ctx: &MessageContext<'_>) -> String {
        let mut msg = format!(
            "Check the following prose for consistency with the established lore.\n\n\
             LOREBOOK DATA:\n{}\n\n",
            or_placeholder(&lore_records(&ctx.lorebook_entries()))
        );
        let previous = ctx.previous_text();
        if !previous.is_empty() {
            msg.push_str(&format!("PREVIOUS CONTEXT:\n{}\n\n", previous));
        }
        msg.push_str(&format!(
            "PROSE TO CHECK:\n{}\n\n\
             List any inconsistencies found. If everything is consistent, respond with just: CONSISTENT",
            ctx.latest_prose()
        ));
        msg
    }
}

impl MessageBuilder for ContinuityCheckerMessages {
    fn compose(&self, ctx: &MessageContext<'_>) -> String {
        let mut msg = format!(
            "Check the following new prose for plot and character continuity with the previous context.\n\n\
             PREVIOUS CONTEXT:\n{}\n\n",
            or_placeholder(ctx.previous_text())
        );
        let lore = lore_records(&ctx.lorebook_entries());
        if !lore.is_empty() {
            msg.push_str(&format!("LOREBOOK DATA:\n{}\n\n", lore));
        }
        msg.push_str(&format!(
            "NEW PROSE:\n{}\n\n\
             List any continuity issues (timeline inconsistencies, character behavior changes, \
             forgotten plot points). If consistent, respond with: CONSISTENT",
            ctx.latest_prose()
        ));
        msg
    }
}

impl MessageBuilder for RefusalCheckerMessages {
    fn compose(&self, ctx: &MessageContext<'_>) -> String {
        format!(
            "Check whether the following response refuses, deflects, or lectures instead of \
             writing what was asked.\n\n\
             REQUESTED INSTRUCTION:\n{}\n\n\
             RESPONSE:\n{}\n\n\
             If the response does not do what was asked, reply with ISSUE: followed by a short \
             explanation. Otherwise respond with just: CONSISTENT",
            ctx.input.instruction,
            ctx.latest_prose()
        )
    }
}

impl MessageBuilder for StyleEditorMessages {
    fn compose(&self, ctx: &MessageContext<'_>) -> String {
        format!(
            "{}Review and polish the following prose for style, flow, and readability. Maintain \
             the author's voice while improving clarity and impact.\n\n\
             PROSE TO EDIT:\n{}\n\nProvide the edited version:",
            ctx.context_sections("RELEVANT LORE"),
            ctx.latest_prose()
        )
    }

    fn revise(&self, ctx: &MessageContext<'_>) -> String {
        revision_request(ctx)
    }
}

impl MessageBuilder for DialogueSpecialistMessages {
    fn compose(&self, ctx: &MessageContext<'_>) -> String {
        format!(
            "{}Review and improve the dialogue in the following prose. Make conversations feel \
             more natural, give each character a distinct voice, and ensure dialogue tags are \
             varied and appropriate.\n\n\
             PROSE:\n{}\n\nProvide the improved version:",
            ctx.context_sections("CHARACTERS AND LORE"),
            ctx.latest_prose()
        )
    }

    fn revise(&self, ctx: &MessageContext<'_>) -> String {
        revision_request(ctx)
    }
}

impl MessageBuilder for ExpanderMessages {
    fn compose(&self, ctx: &MessageContext<'_>) -> String {
        format!(
            "{}Expand the following brief notes/outline into detailed prose:\n\n\
             NOTES:\n{}\n\nWrite a fully expanded scene:",
            ctx.context_sections("RELEVANT LORE"),
            ctx.input.instruction
        )
    }

    fn revise(&self, ctx: &MessageContext<'_>) -> String {
        revision_request(ctx)
    }
}

impl MessageBuilder for OutlineGeneratorMessages {
    fn compose(&self, ctx: &MessageContext<'_>) -> String {
        format!(
            "{}Create a structured outline for what happens next in the story.\n\n\
             DIRECTION:\n{}\n\nList the scenes or beats in order, one per line:",
            ctx.context_sections("WORLD AND CHARACTERS"),
            or_placeholder(&ctx.input.instruction)
        )
    }
}

impl MessageBuilder for StyleExtractorMessages {
    fn compose(&self, ctx: &MessageContext<'_>) -> String {
        let mut msg = format!(
            "Analyze the writing style of the following text. Describe voice, tense, point of \
             view, sentence rhythm, vocabulary, and tone precisely enough that another writer \
             could imitate it.\n\nTEXT:\n{}",
            ctx.previous_text()
        );
        if !ctx.input.instruction.trim().is_empty() {
            msg.push_str(&format!("\n\nFOCUS:\n{}", ctx.input.instruction));
        }
        msg
    }
}

impl MessageBuilder for ScenebeatGeneratorMessages {
    fn compose(&self, ctx: &MessageContext<'_>) -> String {
        let direction = if ctx.input.instruction.trim().is_empty() {
            "Continue naturally from where the story left off."
        } else {
            ctx.input.instruction.as_str()
        };
        format!(
            "{}Suggest the next scene beat: one to three sentences describing what should \
             happen next.\n\nDIRECTION:\n{}\n\nScene beat:",
            ctx.context_sections("RELEVANT LORE"),
            direction
        )
    }
}

impl MessageBuilder for CustomMessages {
    fn compose(&self, ctx: &MessageContext<'_>) -> String {
        let context = ctx.context_sections("RELEVANT LORE");
        let last = ctx.last_output();
        let instruction = ctx.input.instruction.as_str();

        let body = if !last.is_empty() {
            format!("Previous output:\n{}\n\nInstruction: {}", last, instruction)
        } else if !instruction.is_empty() {
            instruction.to_string()
        } else {
            "Process the input as instructed.".to_string()
        };
        format!("{}{}", context, body)
    }
}

/// Handler table: one builder per role.
pub fn builder_for(role: AgentRole) -> &'static dyn MessageBuilder {
    match role {
        AgentRole::Summarizer => &SummarizerMessages,
        AgentRole::ProseWriter => &ProseWriterMessages,
        AgentRole::LoreJudge => &LoreJudgeMessages,
        AgentRole::ContinuityChecker => &ContinuityCheckerMessages,
        AgentRole::RefusalChecker => &RefusalCheckerMessages,
        AgentRole::StyleEditor => &StyleEditorMessages,
        AgentRole::DialogueSpecialist => &DialogueSpecialistMessages,
        AgentRole::Expander => &ExpanderMessages,
        AgentRole::OutlineGenerator => &OutlineGeneratorMessages,
        AgentRole::StyleExtractor => &StyleExtractorMessages,
        AgentRole::ScenebeatGenerator => &ScenebeatGeneratorMessages,
        AgentRole::Custom => &CustomMessages,
    }
}

/// Build the ordered message list for one step execution.
pub fn build_messages(
    agent: &AgentDefinition,
    input: &PipelineInput,
    history: &[StepResult],
    is_revision: bool,
    step: &PipelineStep,
    config: &OrchestratorConfig,
) -> Vec<PromptMessage> {
    let ctx = MessageContext::new(agent, input, history, step, config);
    let builder = builder_for(agent.role);
    let system = PromptMessage::system(agent.system_prompt.clone());

    if !is_revision {
        return vec![system, PromptMessage::user(builder.compose(&ctx))];
    }

    match step.push_prompt_template.as_deref() {
        Some(template) if agent.role.is_producer() => {
            let previous = ctx.latest_prose();
            let follow_up = template
                .replace(PREVIOUS_OUTPUT_PLACEHOLDER, previous)
                .replace(FEEDBACK_PLACEHOLDER, &ctx.feedback());
            vec![
                system,
                PromptMessage::user(builder.compose(&ctx)),
                PromptMessage::assistant(previous),
                PromptMessage::user(follow_up),
            ]
        }
        _ => vec![system, PromptMessage::user(builder.revise(&ctx))],
    }
}
