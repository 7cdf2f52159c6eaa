//! Step executor: one model call, streamed or buffered, timed.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::ModelError;
use crate::model_client::{GenerationRequest, ModelClient, StreamChunk};
use crate::models::{PromptMessage, StepMetadata, StepResult};
use crate::pipeline::step::PipelineStep;

pub struct StepExecutor {
    client: Arc<dyn ModelClient>,
}

impl StepExecutor {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }

    /// Run `step` with the given messages.
    ///
    /// Fragments go to `on_token` as they arrive when it is given; otherwise
    /// the response is buffered. Client errors are returned unchanged, and a
    /// fired `cancel` token always surfaces as [`ModelError::Cancelled`].
    pub async fn execute(
        &self,
        step: &PipelineStep,
        messages: Vec<PromptMessage>,
        iteration: u32,
        on_token: Option<&(dyn Fn(&str) + Send + Sync)>,
        cancel: &CancellationToken,
    ) -> Result<StepResult, ModelError> {
        let agent = &step.agent;
        let started_at = Utc::now();
        let clock = Instant::now();

        let request = GenerationRequest {
            messages: messages.clone(),
            model: agent.model.clone(),
            temperature: agent.temperature,
            max_tokens: agent.max_tokens,
        };

        tracing::debug!(
            "[StepExecutor] Calling {} ({}) with {} messages, streaming={}",
            agent.name,
            agent.model.id,
            messages.len(),
            on_token.is_some()
        );

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ModelError::Cancelled),
            started = self.client.generate(request, cancel.clone()) => started?,
        };

        let mut output = String::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ModelError::Cancelled),
                item = stream.next() => item,
            };
            match next {
                Some(Ok(StreamChunk::Text(fragment))) => {
                    if let Some(on_token) = on_token {
                        on_token(&fragment);
                    }
                    output.push_str(&fragment);
                }
                Some(Ok(StreamChunk::End)) | None => break,
                Some(Err(e)) => return Err(e),
            }
        }

        let duration = clock.elapsed();
        tracing::debug!(
            "[StepExecutor] {} produced {} chars in {}ms",
            agent.name,
            output.len(),
            duration.as_millis()
        );

        Ok(StepResult::new(
            agent.role,
            agent.name.clone(),
            output,
            messages,
            started_at,
            duration,
            StepMetadata {
                is_revision: step.is_revision,
                iteration: Some(iteration),
                error: None,
            },
        ))
    }
}
