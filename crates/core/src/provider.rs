//! Provider trait: the abstraction over model backends.
//!
//! The orchestrator speaks only this request/response contract. Vendor wire
//! shapes (OpenAI chat completions, Gemini generateContent) live in the
//! adapters of `deskpilot-providers`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::{estimate_tokens_for_chars, ConversationTurn};
use crate::tool::ToolDescriptor;

/// A single model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4.1-mini", "gemini-2.0-flash")
    pub model: String,

    /// System instructions
    pub system: String,

    /// The conversation so far, oldest first
    pub messages: Vec<ConversationTurn>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDescriptor>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.3
}

impl ProviderRequest {
    /// Approximate size of the whole request, tool schemas included.
    pub fn estimated_tokens(&self) -> usize {
        let system = self.system.chars().count();
        let tools: usize = self
            .tools
            .iter()
            .map(|t| {
                t.name.chars().count()
                    + t.description.chars().count()
                    + t.parameters_json().to_string().chars().count()
            })
            .sum();
        estimate_tokens_for_chars(system + tools) + crate::message::estimate_turns_tokens(&self.messages)
    }
}

/// A tool call as the model emitted it. Arguments stay raw until parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded argument object
    pub arguments: String,
}

/// One candidate answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMessage {
    #[serde(default)]
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ModelToolCall>,
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Candidate messages; the orchestrator reads the first
    pub choices: Vec<ModelMessage>,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// The agent loop calls `complete()` without knowing which backend answers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "gemini").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}
