//! Deterministic model client that replays canned replies in call order.
//!
//! Used by the test-suite and by `scriptorium run`, where a YAML file of
//! replies stands in for a live provider:
//!
//! ```yaml
//! - text: "It rained all day."
//! - text: "CONSISTENT"
//!   fragment_delay_ms: 20
//! - error: "upstream timed out"
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{GenerationRequest, ModelClient, StreamChunk, TokenStream};
use crate::error::ModelError;

/// One canned reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ScriptedReply {
    Text {
        text: String,
        #[serde(default)]
        fragment_delay_ms: u64,
    },
    Error {
        error: String,
    },
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            fragment_delay_ms: 0,
        }
    }

    pub fn slow(text: impl Into<String>, fragment_delay: Duration) -> Self {
        Self::Text {
            text: text.into(),
            fragment_delay_ms: fragment_delay.as_millis() as u64,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

pub struct ScriptedModelClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModelClient {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Plain-text replies, one per expected call.
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(ScriptedReply::text))
    }

    /// Parse a YAML list of replies.
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        let replies: Vec<ScriptedReply> = serde_yaml::from_str(yaml)
            .map_err(|e| format!("Failed to parse scripted replies YAML: {}", e))?;
        Ok(Self::new(replies))
    }

    /// Every request received so far, in call order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Split text into word-sized fragments, keeping the whitespace attached so
/// the concatenation reproduces the original exactly.
fn fragments(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if ch.is_whitespace() {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<TokenStream, ModelError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        if cancel.is_cancelled() {
            return Err(ModelError::Cancelled);
        }

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| ModelError::Request("No scripted reply left".to_string()))?;

        let (text, delay) = match reply {
            ScriptedReply::Error { error } => return Err(ModelError::Request(error)),
            ScriptedReply::Text {
                text,
                fragment_delay_ms,
            } => (text, Duration::from_millis(fragment_delay_ms)),
        };

        let stream = async_stream::stream! {
            for fragment in fragments(&text) {
                if !delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                if cancel.is_cancelled() {
                    yield Err(ModelError::Cancelled);
                    return;
                }
                yield Ok(StreamChunk::Text(fragment));
            }
            yield Ok(StreamChunk::End);
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelRef, PromptMessage};
    use tokio_stream::StreamExt;

    fn request() -> GenerationRequest {
        GenerationRequest {
            messages: vec![PromptMessage::user("hi")],
            model: ModelRef::new("test-model", "local"),
            temperature: 0.5,
            max_tokens: 64,
        }
    }

    #[test]
    fn test_fragments_reassemble() {
        let parts = fragments("It rained  all day.");
        assert_eq!(parts.concat(), "It rained  all day.");
        assert_eq!(parts[0], "It ");
    }

    #[test]
    fn test_parse_replies_yaml() {
        let yaml = r#"
- text: "It rained all day."
- text: "CONSISTENT"
  fragment_delay_ms: 20
- error: "upstream timed out"
"#;
        let client = ScriptedModelClient::from_yaml(yaml).unwrap();
        assert_eq!(client.remaining(), 3);
    }

    #[tokio::test]
    async fn test_stream_ends_with_marker() {
        let client = ScriptedModelClient::with_texts(["a b"]);
        let mut stream = client
            .generate(request(), CancellationToken::new())
            .await
            .unwrap();
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk.unwrap());
        }
        assert_eq!(
            chunks,
            vec![
                StreamChunk::Text("a ".to_string()),
                StreamChunk::Text("b".to_string()),
                StreamChunk::End
            ]
        );
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_error_reply_and_exhaustion() {
        let client = ScriptedModelClient::new([ScriptedReply::error("boom")]);
        let err = client
            .generate(request(), CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert_eq!(err, ModelError::Request("boom".to_string()));

        let err = client
            .generate(request(), CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(!err.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_token_refuses_to_start() {
        let client = ScriptedModelClient::with_texts(["never"]);
        let token = CancellationToken::new();
        token.cancel();
        let err = client.generate(request(), token).await.err().unwrap();
        assert!(err.is_cancelled());
        assert_eq!(client.remaining(), 1);
    }
}
