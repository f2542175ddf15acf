//! The general-conversation agent.
//!
//! An agent turns a conversation into a stream of [`MessageChunk`]s: a node
//! label plus the content blocks that node produced. Text blocks carry
//! assistant prose, `tool_call` blocks announce a tool invocation, and the
//! `tools` node echoes tool output back as text. [`crate::stream::relay`]
//! interprets these blocks for the chat UI.

pub mod prompt;
pub mod tool_agent;

pub use tool_agent::ToolAgent;

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::llm::Message;

/// Node label for model output.
pub const MODEL_NODE: &str = "model";
/// Node label for tool output.
pub const TOOLS_NODE: &str = "tools";

/// One increment of agent output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageChunk {
    /// Producer of the chunk (`model` or `tools`).
    pub node: String,
    /// Typed content blocks, each an object with a `type` field.
    pub content_blocks: Vec<Value>,
}

impl MessageChunk {
    #[must_use]
    pub fn new(node: impl Into<String>, content_blocks: Vec<Value>) -> Self {
        Self {
            node: node.into(),
            content_blocks,
        }
    }

    /// A single text block from the model.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(MODEL_NODE, vec![json!({ "type": "text", "text": text.into() })])
    }

    /// A single tool invocation block from the model.
    #[must_use]
    pub fn tool_call(id: &str, name: &str, args: Value) -> Self {
        Self::new(
            MODEL_NODE,
            vec![json!({ "type": "tool_call", "id": id, "name": name, "args": args })],
        )
    }

    /// Tool output echoed back as text.
    #[must_use]
    pub fn tool_output(text: impl Into<String>) -> Self {
        Self::new(TOOLS_NODE, vec![json!({ "type": "text", "text": text.into() })])
    }
}

/// Boxed stream of agent chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = anyhow::Result<MessageChunk>> + Send>>;

/// A conversational agent.
#[async_trait::async_trait]
pub trait ChatAgent: Send + Sync {
    /// Start answering the conversation. The last message is the user's turn.
    ///
    /// # Errors
    ///
    /// Returns an error if the first model request cannot be started.
    async fn stream(&self, messages: Vec<Message>) -> anyhow::Result<ChunkStream>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted agent used by relay and server tests.

    use std::sync::Mutex;

    use super::{ChatAgent, ChunkStream, Message, MessageChunk};

    /// Replays fixed chunks, optionally failing after them.
    #[derive(Debug, Default)]
    pub struct ScriptedAgent {
        chunks: Vec<MessageChunk>,
        fail_with: Option<String>,
        pub seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedAgent {
        pub fn new(chunks: Vec<MessageChunk>) -> Self {
            Self {
                chunks,
                ..Self::default()
            }
        }

        pub fn failing(chunks: Vec<MessageChunk>, error: &str) -> Self {
            Self {
                chunks,
                fail_with: Some(error.to_string()),
                ..Self::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl ChatAgent for ScriptedAgent {
        async fn stream(&self, messages: Vec<Message>) -> anyhow::Result<ChunkStream> {
            self.seen.lock().unwrap().push(messages);
            let mut items: Vec<anyhow::Result<MessageChunk>> =
                self.chunks.iter().cloned().map(Ok).collect();
            if let Some(error) = &self.fail_with {
                items.push(Err(anyhow::anyhow!(error.clone())));
            }
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }
}
