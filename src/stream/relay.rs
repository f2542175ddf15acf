//! General chat streaming: relay agent text, hide tool traffic.

use std::sync::Arc;

use futures::{Stream, StreamExt};

use super::classifier::{StreamEvent, classify};
use super::notify::{Notifier, Toast};
use crate::agent::ChatAgent;
use crate::session::Session;

/// Display name for a tool call that carries no name.
pub const UNKNOWN_TOOL: &str = "unknown";

/// Stream the agent's answer to the session's conversation as text fragments.
///
/// The text block right after a tool call is the tool's echo and is dropped.
/// Tool results never reach the caller. Each tool call is announced through
/// `notifier`, except unnamed ones.
///
/// Once the upstream stream ends the concatenated fragments are appended to
/// the session as one assistant message. If the stream fails, the error is
/// yielded and the partial transcript is discarded.
pub fn chat_stream(
    agent: Arc<dyn ChatAgent>,
    session: Session,
    notifier: Arc<dyn Notifier>,
) -> impl Stream<Item = anyhow::Result<String>> + Send + 'static {
    async_stream::try_stream! {
        let mut upstream = agent.stream(session.messages()).await?;
        let mut transcript = String::new();
        let mut suppress_next_text = false;

        while let Some(chunk) = upstream.next().await {
            let chunk = chunk.inspect_err(|e| {
                tracing::warn!(
                    session_id = %session.id(),
                    error = %e,
                    partial_length = transcript.len(),
                    "Chat stream failed, discarding partial transcript"
                );
            })?;

            for event in classify(&chunk) {
                match event {
                    StreamEvent::Text(text) => {
                        if suppress_next_text {
                            suppress_next_text = false;
                            tracing::debug!(node = %chunk.node, length = text.len(), "Suppressed tool echo");
                            continue;
                        }
                        transcript.push_str(&text);
                        yield text;
                    }
                    StreamEvent::ToolCall { name } => {
                        match name.filter(|n| !n.is_empty()) {
                            Some(name) => {
                                tracing::info!(session_id = %session.id(), tool = %name, "Tool call");
                                notifier.notify(Toast::info(format!("Usando herramienta: {name}")));
                            }
                            None => {
                                tracing::debug!(session_id = %session.id(), tool = UNKNOWN_TOOL, "Tool call");
                            }
                        }
                        suppress_next_text = true;
                    }
                    StreamEvent::ToolResult(_) => {}
                }
            }
        }

        tracing::debug!(session_id = %session.id(), length = transcript.len(), "Chat stream complete");
        session.add_assistant_message(transcript);
    }
}
