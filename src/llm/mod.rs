//! LLM driver traits and implementations.
//!
//! This module provides the protocol layer between DocuChat and an
//! OpenAI-compatible Chat Completions endpoint (Gemini's compatibility
//! endpoint by default).
//!
//! # Overview
//!
//! The [`LlmDriver`] trait defines the core streaming interface. The tool
//! agent in [`crate::agent`] and the RAG chain in [`crate::rag`] build on top
//! of a driver.
//!
//! # Example
//!
//! ```rust,ignore
//! use docuchat::llm::{ChatCompletionsDriver, LlmSettings};
//!
//! let settings = LlmSettings::from_env()?;
//! let driver = ChatCompletionsDriver::new(settings);
//! ```

pub mod chat_completions;
pub mod provider;

pub use chat_completions::ChatCompletionsDriver;
pub use provider::Provider;

use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

/// Default base URL (Gemini's OpenAI-compatible endpoint).
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// LLM connection and model settings.
#[derive(Clone)]
pub struct LlmSettings {
    /// Base URL for the LLM API.
    pub base_url: String,
    /// Optional server-wide API key. Sessions may supply their own.
    pub api_key: Option<String>,
    /// Model identifier (e.g., `gemini-2.5-flash`).
    pub model: String,
    /// Provider type (auto-detected from `base_url`).
    pub provider: Provider,
    /// Sampling temperature.
    pub temperature: f32,
    /// Retries for the initial request on transport errors, 429 and 5xx.
    pub max_retries: u32,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("provider", &self.provider)
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl LlmSettings {
    /// Load settings from `LLM_*` environment variables, falling back to the
    /// Gemini defaults.
    pub fn from_env() -> Result<Self, String> {
        let base_url = std::env::var("LLM_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let model = std::env::var("LLM_MODEL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let api_key = std::env::var("LLM_API_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let temperature = match std::env::var("LLM_TEMPERATURE") {
            Ok(raw) => raw
                .parse::<f32>()
                .map_err(|_| format!("LLM_TEMPERATURE is not a number: {raw}"))?,
            Err(_) => 1.0,
        };

        let max_retries = match std::env::var("LLM_MAX_RETRIES") {
            Ok(raw) => raw
                .parse::<u32>()
                .map_err(|_| format!("LLM_MAX_RETRIES is not an integer: {raw}"))?,
            Err(_) => 2,
        };

        Ok(Self {
            provider: Provider::detect_from_url(&base_url),
            base_url,
            api_key,
            model,
            temperature,
            max_retries,
        })
    }

    /// Copy of these settings using the given API key.
    #[must_use]
    pub fn with_api_key(&self, api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..self.clone()
        }
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,
    /// Text content of the message.
    pub content: String,
    /// Optional tool call ID (for tool responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Optional tool calls made by the assistant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    /// Create a plain message with the given role.
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Serialize into the wire shape expected by Chat Completions.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
    /// Tool response.
    Tool,
}

/// A tool call made by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call.
    pub id: String,
    /// Type of tool (always "function").
    #[serde(rename = "type")]
    pub call_type: String,
    /// Function details.
    pub function: ToolCallFunction,
}

/// Function details in a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    /// Function name.
    pub name: String,
    /// Arguments as JSON string.
    pub arguments: String,
}

/// Request to an LLM driver.
#[derive(Debug, Default)]
pub struct LlmRequest {
    /// Conversation messages in wire format.
    pub messages: Vec<serde_json::Value>,
    /// Available tools in `OpenAI` function schema format.
    pub tools: Vec<serde_json::Value>,
}

impl LlmRequest {
    /// Build a tool-less request from typed messages.
    #[must_use]
    pub fn from_messages(messages: &[Message]) -> Self {
        Self {
            messages: messages.iter().map(Message::to_json).collect(),
            tools: Vec::new(),
        }
    }
}

/// Events emitted by a driver while the model streams its answer.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    /// Incremental assistant text.
    TextDelta { text: String },
    /// Tool call fully assembled.
    ToolCallComplete {
        call_index: usize,
        id: String,
        name: String,
        arguments_json: String,
    },
    /// End of the model's turn.
    Done,
}

/// Boxed stream of driver events.
pub type LlmEventStream = Pin<Box<dyn Stream<Item = anyhow::Result<LlmEvent>> + Send>>;

/// Trait for LLM streaming drivers.
#[async_trait::async_trait]
pub trait LlmDriver: Send + Sync {
    /// Stream a response from the LLM.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the connection is interrupted.
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<LlmEventStream>;
}

/// Run a request to completion and return the concatenated assistant text.
pub async fn complete_text(driver: &dyn LlmDriver, req: LlmRequest) -> anyhow::Result<String> {
    let mut stream = driver.stream(req).await?;
    let mut content = String::new();

    while let Some(event) = stream.next().await {
        if let LlmEvent::TextDelta { text } = event? {
            content.push_str(&text);
        }
    }

    Ok(content)
}
