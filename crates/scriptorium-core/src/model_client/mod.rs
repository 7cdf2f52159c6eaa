//! Model client collaborator.
//!
//! The orchestrator never talks to a provider directly. It hands a
//! [`GenerationRequest`] and a cancellation token to a [`ModelClient`] and
//! consumes the returned [`TokenStream`] until [`StreamChunk::End`].
//!
//! ```text
//! StepExecutor ──► ModelClient::generate(request, cancel)
//!                        │
//!                        ▼
//!                  Text("It ") Text("rained") ... End
//! ```

pub mod scripted;

use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::ModelError;
use crate::models::{ModelRef, PromptMessage};

pub use scripted::{ScriptedModelClient, ScriptedReply};

/// One item of a model response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Text(String),
    /// Explicit end-of-response marker.
    End,
}

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ModelError>> + Send>>;

/// Everything a provider needs for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub messages: Vec<PromptMessage>,
    pub model: ModelRef,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Start a generation. Implementations must stop producing fragments once
    /// `cancel` fires and report it as [`ModelError::Cancelled`].
    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<TokenStream, ModelError>;
}
