//! Per-agent context policy.
//!
//! Every role has a default policy describing which knowledge entries and how
//! much previous narrative text go into its prompt. An agent may carry a
//! partial [`ContextConfig`]; its explicit fields override the role default
//! field by field, producing the [`EffectiveContext`] the assembler uses.

use serde::{Deserialize, Serialize};

use super::agent::AgentRole;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LorebookMode {
    /// No knowledge entries.
    None,
    /// The full entry set, truncated to `lorebook_limit`.
    All,
    /// Entries listed in `custom_entry_ids`, truncated to `lorebook_limit`.
    Custom,
    /// The input's pre-matched entries, unmodified.
    Matched,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PreviousTextMode {
    None,
    /// Latest summarizer output; falls back to `Limited` when none exists yet.
    Summarized,
    /// The last `previous_text_limit` characters.
    Limited,
    Full,
}

/// Agent-level overrides. Unset fields inherit the role default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lorebook_mode: Option<LorebookMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lorebook_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_entry_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_text_mode: Option<PreviousTextMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_text_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_pov_info: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_chapter_summary: Option<bool>,
}

/// Fully resolved policy for one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveContext {
    pub lorebook_mode: LorebookMode,
    pub lorebook_limit: Option<usize>,
    pub custom_entry_ids: Vec<String>,
    pub previous_text_mode: PreviousTextMode,
    pub previous_text_limit: Option<usize>,
    pub include_pov_info: bool,
    pub include_chapter_summary: bool,
}

impl EffectiveContext {
    const fn new(
        lorebook_mode: LorebookMode,
        lorebook_limit: Option<usize>,
        previous_text_mode: PreviousTextMode,
        previous_text_limit: Option<usize>,
        include_pov_info: bool,
        include_chapter_summary: bool,
    ) -> Self {
        Self {
            lorebook_mode,
            lorebook_limit,
            custom_entry_ids: Vec::new(),
            previous_text_mode,
            previous_text_limit,
            include_pov_info,
            include_chapter_summary,
        }
    }

    /// The documented default policy for a role.
    pub fn role_default(role: AgentRole) -> Self {
        use LorebookMode as L;
        use PreviousTextMode as P;

        match role {
            AgentRole::Summarizer => Self::new(L::None, None, P::Full, None, false, false),
            AgentRole::ProseWriter => {
                Self::new(L::Matched, None, P::Summarized, Some(3000), true, true)
            }
            AgentRole::LoreJudge => Self::new(L::Matched, None, P::None, None, false, false),
            AgentRole::ContinuityChecker => {
                Self::new(L::None, None, P::Limited, Some(2000), false, false)
            }
            AgentRole::RefusalChecker => Self::new(L::None, None, P::None, None, false, false),
            AgentRole::StyleEditor => Self::new(L::None, None, P::None, None, false, false),
            AgentRole::DialogueSpecialist => {
                Self::new(L::Matched, Some(5), P::None, None, true, false)
            }
            AgentRole::Expander => Self::new(L::Matched, None, P::Limited, Some(2000), true, false),
            AgentRole::OutlineGenerator => {
                Self::new(L::All, Some(20), P::Summarized, Some(5000), false, true)
            }
            AgentRole::StyleExtractor => {
                Self::new(L::None, None, P::Limited, Some(5000), false, false)
            }
            AgentRole::ScenebeatGenerator => {
                Self::new(L::Matched, None, P::Summarized, Some(3000), true, true)
            }
            AgentRole::Custom => Self::new(L::None, None, P::None, None, false, false),
        }
    }
}

impl ContextConfig {
    /// Merge agent overrides (if any) onto the role default.
    pub fn resolve(overrides: Option<&ContextConfig>, role: AgentRole) -> EffectiveContext {
        let mut effective = EffectiveContext::role_default(role);
        let Some(o) = overrides else {
            return effective;
        };

        if let Some(mode) = o.lorebook_mode {
            effective.lorebook_mode = mode;
        }
        if o.lorebook_limit.is_some() {
            effective.lorebook_limit = o.lorebook_limit;
        }
        if let Some(ids) = &o.custom_entry_ids {
            effective.custom_entry_ids = ids.clone();
        }
        if let Some(mode) = o.previous_text_mode {
            effective.previous_text_mode = mode;
        }
        if o.previous_text_limit.is_some() {
            effective.previous_text_limit = o.previous_text_limit;
        }
        if let Some(pov) = o.include_pov_info {
            effective.include_pov_info = pov;
        }
        if let Some(summary) = o.include_chapter_summary {
            effective.include_chapter_summary = summary;
        }
        effective
    }
}
