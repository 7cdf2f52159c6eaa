//! Preset store: where agent and pipeline definitions come from.
//!
//! [`PresetCatalog`] is the in-process store: it starts with the built-in
//! system presets and can load more from a directory laid out as
//!
//! ```text
//! <dir>/agents/*.yaml      AgentDefinition, one per file
//! <dir>/pipelines/*.yaml   PipelinePreset, one per file
//! ```
//!
//! File presets replace built-ins with the same id.

pub mod builtin;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::models::AgentDefinition;
use crate::pipeline::schema::PipelinePreset;
use crate::pipeline::step::PipelineStep;

/// Read-only source of presets, shared by concurrent runs.
#[async_trait]
pub trait PresetStore: Send + Sync {
    async fn load_agent(&self, id: &str) -> Result<AgentDefinition, PipelineError>;

    async fn load_pipeline(&self, id: &str) -> Result<PipelinePreset, PipelineError>;

    async fn list_agents(&self) -> Vec<AgentDefinition>;

    async fn list_pipelines(&self) -> Vec<PipelinePreset>;
}

/// Resolve every agent a preset references and build runtime steps.
/// An agent used by several steps is loaded once and shared.
pub async fn resolve_steps(
    store: &dyn PresetStore,
    preset: &PipelinePreset,
) -> Result<Vec<PipelineStep>, PipelineError> {
    let mut agents: HashMap<&str, Arc<AgentDefinition>> = HashMap::new();
    let mut steps = Vec::with_capacity(preset.steps.len());

    for spec in &preset.steps {
        let agent = match agents.get(spec.agent.as_str()) {
            Some(agent) => agent.clone(),
            None => {
                let agent = Arc::new(store.load_agent(&spec.agent).await?);
                agents.insert(spec.agent.as_str(), agent.clone());
                agent
            }
        };
        steps.push(PipelineStep::from_spec(spec, agent));
    }

    Ok(steps)
}

/// Load a pipeline preset by id and resolve its steps.
pub async fn resolve_pipeline(
    store: &dyn PresetStore,
    preset_id: &str,
) -> Result<Vec<PipelineStep>, PipelineError> {
    let preset = store.load_pipeline(preset_id).await?;
    resolve_steps(store, &preset).await
}

/// In-memory preset catalog with optional YAML directory loading.
pub struct PresetCatalog {
    agents: HashMap<String, AgentDefinition>,
    pipelines: HashMap<String, PipelinePreset>,
}

impl Default for PresetCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl PresetCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
            pipelines: HashMap::new(),
        }
    }

    /// A catalog pre-filled with the system presets.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        for agent in builtin::builtin_agents() {
            catalog.insert_agent(agent);
        }
        for pipeline in builtin::builtin_pipelines() {
            catalog.insert_pipeline(pipeline);
        }
        catalog
    }

    pub fn insert_agent(&mut self, agent: AgentDefinition) {
        self.agents.insert(agent.id.clone(), agent);
    }

    pub fn insert_pipeline(&mut self, pipeline: PipelinePreset) {
        self.pipelines.insert(pipeline.id.clone(), pipeline);
    }

    pub fn agent(&self, id: &str) -> Option<&AgentDefinition> {
        self.agents.get(id)
    }

    pub fn pipeline(&self, id: &str) -> Option<&PipelinePreset> {
        self.pipelines.get(id)
    }

    /// Load `agents/` and `pipelines/` under `dir`. Returns how many presets
    /// were loaded. Either subdirectory may be missing.
    pub fn load_dir(&mut self, dir: &str) -> Result<usize, PipelineError> {
        let root = Path::new(dir);
        if !root.is_dir() {
            return Err(PipelineError::Io(format!(
                "Preset directory '{}' does not exist",
                dir
            )));
        }

        let mut count = 0;

        for path in yaml_files(&root.join("agents"))? {
            let content = read(&path)?;
            let agent = AgentDefinition::from_yaml(&content)
                .map_err(|e| PipelineError::Parse(format!("{}: {}", path.display(), e)))?;
            tracing::info!("[PresetCatalog] Loaded agent: {} ({})", agent.id, agent.name);
            self.insert_agent(agent);
            count += 1;
        }

        for path in yaml_files(&root.join("pipelines"))? {
            let content = read(&path)?;
            let pipeline = PipelinePreset::from_yaml(&content)
                .map_err(|e| PipelineError::Parse(format!("{}: {}", path.display(), e)))?;
            tracing::info!(
                "[PresetCatalog] Loaded pipeline: {} ({}, {} steps)",
                pipeline.id,
                pipeline.name,
                pipeline.steps.len()
            );
            self.insert_pipeline(pipeline);
            count += 1;
        }

        Ok(count)
    }

    /// Load from `./presets` and `<config dir>/scriptorium/presets` when they
    /// exist. Failures are logged and skipped.
    pub fn load_default_dirs(&mut self) -> usize {
        let mut search_paths = vec!["presets".to_string()];
        if let Some(config) = dirs::config_dir() {
            search_paths.push(
                config
                    .join("scriptorium")
                    .join("presets")
                    .to_string_lossy()
                    .into_owned(),
            );
        }

        let mut total = 0;
        for dir in &search_paths {
            if !Path::new(dir).is_dir() {
                continue;
            }
            match self.load_dir(dir) {
                Ok(n) => {
                    tracing::info!("[PresetCatalog] Loaded {} presets from '{}'", n, dir);
                    total += n;
                }
                Err(e) => {
                    tracing::warn!("[PresetCatalog] Failed to load from '{}': {}", dir, e);
                }
            }
        }
        total
    }
}

fn read(path: &Path) -> Result<String, PipelineError> {
    std::fs::read_to_string(path)
        .map_err(|e| PipelineError::Io(format!("Failed to read '{}': {}", path.display(), e)))
}

/// `*.yaml` / `*.yml` files in `dir`, sorted by name. A missing directory is empty.
fn yaml_files(dir: &Path) -> Result<Vec<std::path::PathBuf>, PipelineError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir).map_err(|e| {
        PipelineError::Io(format!("Failed to read directory '{}': {}", dir.display(), e))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| PipelineError::Io(format!("Directory entry error: {}", e)))?
            .path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if matches!(ext, "yaml" | "yml") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[async_trait]
impl PresetStore for PresetCatalog {
    async fn load_agent(&self, id: &str) -> Result<AgentDefinition, PipelineError> {
        self.agents
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(format!("Agent preset not found: {}", id)))
    }

    async fn load_pipeline(&self, id: &str) -> Result<PipelinePreset, PipelineError> {
        self.pipelines
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(format!("Pipeline preset not found: {}", id)))
    }

    async fn list_agents(&self) -> Vec<AgentDefinition> {
        let mut agents: Vec<_> = self.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    async fn list_pipelines(&self) -> Vec<PipelinePreset> {
        let mut pipelines: Vec<_> = self.pipelines.values().cloned().collect();
        pipelines.sort_by(|a, b| a.id.cmp(&b.id));
        pipelines
    }
}
