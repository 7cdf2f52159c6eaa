//! Pipeline engine. Sequences agent calls that write, check and revise prose.
//!
//! A pipeline is an ordered list of steps. Each step names an agent, an
//! optional condition, and optionally a retry loop back to an earlier step.
//!
//! # Architecture
//!
//! ```text
//! pipelines/*.yaml ──► PipelinePreset ──► PresetStore ──► Vec<PipelineStep>
//!                                                               │
//!                                                     PipelineOrchestrator
//!                                                               │
//!                          ┌──────────────────┬─────────────────┤
//!                          ▼                  ▼                 ▼
//!                      Condition       MessageBuilder     StepExecutor
//!                                                               │
//!                                                 ModelClient (fragments)
//! ```

pub mod condition;
pub mod context;
pub mod executor;
pub mod scheduler;
pub mod schema;
pub mod step;

pub use condition::{Comparison, Condition, ISSUE_MARKERS};
pub use context::{build_messages, builder_for, MessageBuilder, MessageContext};
pub use executor::StepExecutor;
pub use scheduler::{OrchestratorConfig, PipelineCallbacks, PipelineOrchestrator};
pub use schema::{PipelinePreset, PipelineStepSpec, RetryLoop};
pub use step::{validate_steps, PipelineStep};
