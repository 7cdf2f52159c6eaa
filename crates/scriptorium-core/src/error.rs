//! Core error types for the Scriptorium pipeline engine.
//!
//! `PipelineError` covers preset loading, definition validation and step
//! execution. `ModelError` is what a [`ModelClient`](crate::model_client::ModelClient)
//! raises; cancellation is its own variant so the scheduler can tell an
//! aborted run apart from a failed one.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("Generation cancelled")]
    Cancelled,

    #[error("Model request failed: {0}")]
    Request(String),

    #[error("Model stream failed: {0}")]
    Stream(String),
}

impl ModelError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ModelError::Cancelled)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid pipeline definition: {0}")]
    InvalidDefinition(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl PipelineError {
    /// True when the error is a model call interrupted by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Model(e) if e.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_distinguishable() {
        let cancelled: PipelineError = ModelError::Cancelled.into();
        let failed: PipelineError = ModelError::Request("timeout".to_string()).into();
        assert!(cancelled.is_cancelled());
        assert!(!failed.is_cancelled());
        assert_eq!(failed.to_string(), "Model request failed: timeout");
    }
}
