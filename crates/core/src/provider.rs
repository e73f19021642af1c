//! Provider trait: the abstraction over the completion service.
//!
//! A Provider knows how to send a conversation to an LLM and get the
//! generated text back. The orchestration core only ever calls `complete()`;
//! `stream()` exists for presentation layers that want progressive output.
//!
//! Implementations: OpenAI-compatible endpoints, retry wrappers, test mocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

/// Size of the pieces produced by the default `stream()` implementation.
pub const STREAM_CHUNK_CHARS: usize = 64;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "anthropic/claude-sonnet-4", "gpt-4o")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    /// Build a request with the usual system + user message pair.
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_input: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message::system(system_prompt), Message::user(user_input)],
            temperature: default_temperature(),
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    pub content: String,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,
}

/// Split finished text into display chunks on char boundaries.
pub fn chunk_text(text: &str, chunk_chars: usize) -> Vec<String> {
    let chunk_chars = chunk_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(chunk_chars)
        .map(|c| c.iter().collect())
        .collect()
}

/// The core Provider trait.
///
/// Every completion backend implements this trait. The pipeline executor and
/// the intelligent orchestrator call `complete()` without knowing which
/// provider is behind it. Timeouts and retries are the implementation's
/// responsibility.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Send a request and get the response as a stream of chunks.
    ///
    /// Default implementation calls `complete()` and chunks the finished
    /// text; orchestration semantics are unaffected.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let response = self.complete(request).await?;
        let pieces = chunk_text(&response.message.content, STREAM_CHUNK_CHARS);
        let (tx, rx) = tokio::sync::mpsc::channel(pieces.len());
        let last = pieces.len() - 1;
        for (i, content) in pieces.into_iter().enumerate() {
            let _ = tx
                .send(Ok(StreamChunk {
                    content,
                    done: i == last,
                }))
                .await;
        }
        Ok(rx)
    }

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ProviderResponse {
                message: Message::assistant(last),
                usage: None,
                model: request.model,
            })
        }
    }

    #[test]
    fn provider_request_defaults() {
        let req = ProviderRequest::new("gpt-4o", "system", "hi");
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(req.max_tokens.is_none());
        assert_eq!(req.messages.len(), 2);
    }

    #[test]
    fn chunk_text_respects_char_boundaries() {
        let chunks = chunk_text("héllo wörld", 4);
        assert_eq!(chunks.concat(), "héllo wörld");
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
    }

    #[tokio::test]
    async fn default_stream_reassembles_to_complete_text() {
        let text = "x".repeat(STREAM_CHUNK_CHARS * 2 + 3);
        let mut rx = EchoProvider
            .stream(ProviderRequest::new("m", "s", text.clone()))
            .await
            .unwrap();

        let mut out = String::new();
        let mut saw_done = false;
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk.unwrap();
            out.push_str(&chunk.content);
            saw_done = chunk.done;
        }
        assert_eq!(out, text);
        assert!(saw_done);
    }
}
