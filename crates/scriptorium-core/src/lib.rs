//! Scriptorium Core: agent pipeline orchestration for story writing.
//!
//! This crate holds the data model and the pipeline engine that drives chains
//! of language-model agents to draft, check and revise prose. It knows nothing
//! about any particular model provider or storage; both come in through the
//! [`ModelClient`] and [`PresetStore`] traits, which makes it usable from:
//!
//! - the `scriptorium` CLI
//! - an editor backend hosting its own provider client
//! - tests, via [`ScriptedModelClient`]

pub mod error;
pub mod model_client;
pub mod models;
pub mod pipeline;
pub mod presets;
pub mod text;

// Convenience re-exports
pub use error::{ModelError, PipelineError};
pub use model_client::{ModelClient, ScriptedModelClient, ScriptedReply};
pub use pipeline::{OrchestratorConfig, PipelineCallbacks, PipelineOrchestrator, PipelineStep};
pub use presets::{PresetCatalog, PresetStore};
