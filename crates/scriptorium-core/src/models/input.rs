use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A lorebook record (character, location, item, ...). Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "note".to_string()
}

impl KnowledgeEntry {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            category: category.into(),
        }
    }
}

/// Point-of-view metadata for the scene being written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PovInfo {
    /// e.g. "First Person", "Third Person Limited"
    #[serde(default)]
    pub pov_type: Option<String>,
    #[serde(default)]
    pub character: Option<String>,
}

/// Everything a run reads from the editor. Supplied once, never mutated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineInput {
    /// The scene beat / instruction text.
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub previous_text: String,
    #[serde(default)]
    pub matched_entries: Vec<KnowledgeEntry>,
    #[serde(default)]
    pub all_entries: Vec<KnowledgeEntry>,
    #[serde(default)]
    pub chapter_summary: Option<String>,
    #[serde(default)]
    pub pov: Option<PovInfo>,
    #[serde(default)]
    pub extensions: HashMap<String, serde_json::Value>,
}

impl PipelineInput {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            ..Default::default()
        }
    }

    pub fn with_previous_text(mut self, text: impl Into<String>) -> Self {
        self.previous_text = text.into();
        self
    }

    pub fn with_matched_entries(mut self, entries: Vec<KnowledgeEntry>) -> Self {
        self.matched_entries = entries;
        self
    }

    pub fn with_all_entries(mut self, entries: Vec<KnowledgeEntry>) -> Self {
        self.all_entries = entries;
        self
    }

    pub fn with_chapter_summary(mut self, summary: impl Into<String>) -> Self {
        self.chapter_summary = Some(summary.into());
        self
    }

    pub fn with_pov(mut self, pov_type: impl Into<String>, character: Option<&str>) -> Self {
        self.pov = Some(PovInfo {
            pov_type: Some(pov_type.into()),
            character: character.map(str::to_string),
        });
        self
    }

    /// Parse an input document from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        serde_yaml::from_str(yaml).map_err(|e| format!("Failed to parse pipeline input YAML: {}", e))
    }
}
