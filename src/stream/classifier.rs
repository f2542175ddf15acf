//! Classification of agent content blocks.

use serde_json::Value;

use crate::agent::MessageChunk;

/// What a single content block means to the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Assistant (or tool echo) text.
    Text(String),
    /// The agent invoked a tool. The name may be absent.
    ToolCall { name: Option<String> },
    /// Structured tool result; never shown to the user.
    ToolResult(Value),
}

/// Classify one content block.
///
/// `tool_call_chunk` blocks count as tool calls. Text blocks without a
/// string `text` field and blocks of unknown type yield `None`.
#[must_use]
pub fn classify_block(block: &Value) -> Option<StreamEvent> {
    match block.get("type").and_then(Value::as_str)? {
        "text" => block
            .get("text")
            .and_then(Value::as_str)
            .map(|text| StreamEvent::Text(text.to_string())),
        "tool_call" | "tool_call_chunk" => Some(StreamEvent::ToolCall {
            name: block
                .get("name")
                .and_then(Value::as_str)
                .map(ToString::to_string),
        }),
        "tool_result" => Some(StreamEvent::ToolResult(block.clone())),
        other => {
            tracing::trace!(block_type = other, "Ignoring content block");
            None
        }
    }
}

/// Classify every block of a chunk, in order.
pub fn classify(chunk: &MessageChunk) -> impl Iterator<Item = StreamEvent> + '_ {
    chunk.content_blocks.iter().filter_map(classify_block)
}
