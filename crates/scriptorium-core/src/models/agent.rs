use serde::{Deserialize, Serialize};

use super::context::ContextConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    ProseWriter,
    StyleEditor,
    DialogueSpecialist,
    Expander,
    Summarizer,
    LoreJudge,
    ContinuityChecker,
    RefusalChecker,
    OutlineGenerator,
    StyleExtractor,
    ScenebeatGenerator,
    Custom,
}

impl AgentRole {
    pub const ALL: [AgentRole; 12] = [
        Self::ProseWriter,
        Self::StyleEditor,
        Self::DialogueSpecialist,
        Self::Expander,
        Self::Summarizer,
        Self::LoreJudge,
        Self::ContinuityChecker,
        Self::RefusalChecker,
        Self::OutlineGenerator,
        Self::StyleExtractor,
        Self::ScenebeatGenerator,
        Self::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProseWriter => "prose_writer",
            Self::StyleEditor => "style_editor",
            Self::DialogueSpecialist => "dialogue_specialist",
            Self::Expander => "expander",
            Self::Summarizer => "summarizer",
            Self::LoreJudge => "lore_judge",
            Self::ContinuityChecker => "continuity_checker",
            Self::RefusalChecker => "refusal_checker",
            Self::OutlineGenerator => "outline_generator",
            Self::StyleExtractor => "style_extractor",
            Self::ScenebeatGenerator => "scenebeat_generator",
            Self::Custom => "custom",
        }
    }

    /// Case-insensitive lookup by the snake_case name.
    pub fn from_str(s: &str) -> Option<Self> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|role| role.as_str() == needle)
    }

    /// Roles whose output is the pipeline's deliverable prose.
    pub fn is_producer(&self) -> bool {
        matches!(
            self,
            Self::ProseWriter | Self::StyleEditor | Self::DialogueSpecialist | Self::Expander
        )
    }

    /// Roles that review prose and report issues instead of producing it.
    pub fn is_judge(&self) -> bool {
        matches!(
            self,
            Self::LoreJudge | Self::ContinuityChecker | Self::RefusalChecker
        )
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which model an agent talks to. `provider` is an opaque routing hint for
/// the model client (e.g. "openrouter", "local").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelRef {
    pub id: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn default_provider() -> String {
    "openrouter".to_string()
}

impl ModelRef {
    pub fn new(id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            name: None,
        }
    }
}

/// A reusable role + instruction + model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub role: AgentRole,
    pub system_prompt: String,
    pub model: ModelRef,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextConfig>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

impl AgentDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        role: AgentRole,
        system_prompt: impl Into<String>,
        model: ModelRef,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            role,
            system_prompt: system_prompt.into(),
            model,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: ContextConfig) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Parse an agent definition from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        serde_yaml::from_str(yaml).map_err(|e| format!("Failed to parse agent YAML: {}", e))
    }
}
