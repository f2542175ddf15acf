//! Tool-calling agent loop.
//!
//! The agent manages the complete lifecycle of one conversational turn:
//! 1. Send the conversation (with the system prompt) to the model
//! 2. Stream the response, collecting tool calls
//! 3. Execute tool calls through the [`ToolRegistry`]
//! 4. Feed tool results back to the model
//! 5. Repeat until the model produces a final response

use std::sync::Arc;

use futures::StreamExt;
use uuid::Uuid;

use super::{ChatAgent, ChunkStream, MessageChunk};
use crate::llm::{LlmDriver, LlmEvent, LlmRequest, Message, ToolCall, ToolCallFunction};
use crate::tools::ToolRegistry;

/// Maximum number of tool loop iterations to prevent infinite loops.
const MAX_TOOL_ITERATIONS: usize = 10;

/// Agent that answers with the model and runs the tools it asks for.
#[derive(Clone)]
pub struct ToolAgent {
    driver: Arc<dyn LlmDriver>,
    tools: ToolRegistry,
    system_prompt: String,
}

impl std::fmt::Debug for ToolAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolAgent")
            .field("tools", &self.tools)
            .field("system_prompt_len", &self.system_prompt.len())
            .finish()
    }
}

impl ToolAgent {
    #[must_use]
    pub fn new(driver: Arc<dyn LlmDriver>, tools: ToolRegistry, system_prompt: impl Into<String>) -> Self {
        Self {
            driver,
            tools,
            system_prompt: system_prompt.into(),
        }
    }
}

#[async_trait::async_trait]
impl ChatAgent for ToolAgent {
    async fn stream(&self, messages: Vec<Message>) -> anyhow::Result<ChunkStream> {
        let request_id = Uuid::new_v4().to_string();
        let tools = self.tools.openai_tools_json();

        tracing::info!(
            request_id = %request_id,
            message_count = messages.len(),
            tool_count = tools.len(),
            "Starting agent turn"
        );

        let agent = self.clone();

        let stream = async_stream::try_stream! {
            let mut message_json: Vec<serde_json::Value> = std::iter::once(Message::system(&agent.system_prompt))
                .chain(messages)
                .map(|m| m.to_json())
                .collect();

            let mut iteration = 0;

            loop {
                if iteration >= MAX_TOOL_ITERATIONS {
                    tracing::error!(
                        request_id = %request_id,
                        max_iterations = MAX_TOOL_ITERATIONS,
                        "Maximum tool loop iterations exceeded"
                    );
                    Err::<(), _>(anyhow::anyhow!("Maximum tool loop iterations exceeded"))?;
                }
                iteration += 1;

                tracing::debug!(
                    request_id = %request_id,
                    iteration = iteration,
                    message_count = message_json.len(),
                    "Sending request to LLM driver"
                );

                let req = LlmRequest {
                    messages: message_json.clone(),
                    tools: tools.clone(),
                };
                let mut driver_stream = agent.driver.stream(req).await?;

                let mut assistant_text = String::new();
                let mut tool_calls: Vec<ToolCall> = Vec::new();

                while let Some(event) = driver_stream.next().await {
                    match event? {
                        LlmEvent::TextDelta { text } => {
                            assistant_text.push_str(&text);
                            yield MessageChunk::text(text);
                        }
                        LlmEvent::ToolCallComplete { id, name, arguments_json, .. } => {
                            tool_calls.push(ToolCall {
                                id,
                                call_type: "function".to_string(),
                                function: ToolCallFunction {
                                    name,
                                    arguments: arguments_json,
                                },
                            });
                        }
                        LlmEvent::Done => {}
                    }
                }

                if tool_calls.is_empty() {
                    tracing::info!(
                        request_id = %request_id,
                        iteration = iteration,
                        answer_length = assistant_text.len(),
                        "Agent turn complete"
                    );
                    break;
                }

                message_json.push(serde_json::json!({
                    "role": "assistant",
                    "content": if assistant_text.is_empty() { serde_json::Value::Null } else { serde_json::Value::String(assistant_text.clone()) },
                    "tool_calls": tool_calls,
                }));

                for tool_call in &tool_calls {
                    let tool_name = &tool_call.function.name;
                    let arguments: serde_json::Value = serde_json::from_str(&tool_call.function.arguments)
                        .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

                    yield MessageChunk::tool_call(&tool_call.id, tool_name, arguments.clone());

                    tracing::info!(
                        request_id = %request_id,
                        iteration = iteration,
                        tool_id = %tool_call.id,
                        tool_name = %tool_name,
                        "Executing tool call"
                    );

                    let content = match agent.tools.call_tool(tool_name, arguments).await {
                        Ok(content) => content,
                        Err(e) => {
                            tracing::error!(
                                request_id = %request_id,
                                tool_name = %tool_name,
                                error = %e,
                                "Tool call failed"
                            );
                            format!("Error: {e}")
                        }
                    };

                    yield MessageChunk::tool_output(content.clone());

                    message_json.push(serde_json::json!({
                        "role": "tool",
                        "tool_call_id": tool_call.id,
                        "content": content
                    }));
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedDriver;
    use crate::tools::CalculateTool;
    use futures::TryStreamExt;

    fn text(t: &str) -> LlmEvent {
        LlmEvent::TextDelta { text: t.to_string() }
    }

    #[tokio::test]
    async fn test_plain_answer() {
        let driver = Arc::new(ScriptedDriver::new(vec![vec![
            text("Hola"),
            text(" mundo"),
            LlmEvent::Done,
        ]]));
        let agent = ToolAgent::new(driver.clone(), ToolRegistry::new_empty(), "sistema");

        let chunks: Vec<MessageChunk> = agent
            .stream(vec![Message::user("hola")])
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(chunks, vec![MessageChunk::text("Hola"), MessageChunk::text(" mundo")]);

        let requests = driver.requests.lock().unwrap();
        assert_eq!(requests[0][0]["role"], "system");
        assert_eq!(requests[0][0]["content"], "sistema");
        assert_eq!(requests[0][1]["content"], "hola");
    }

    #[tokio::test]
    async fn test_tool_loop_interleaves_call_and_output() {
        let driver = Arc::new(ScriptedDriver::new(vec![
            vec![
                LlmEvent::ToolCallComplete {
                    call_index: 0,
                    id: "call_1".to_string(),
                    name: "calculate".to_string(),
                    arguments_json: r#"{"expression":"6*7"}"#.to_string(),
                },
                LlmEvent::Done,
            ],
            vec![text("Son 42"), LlmEvent::Done],
        ]));
        let tools = ToolRegistry::new_empty().with_tool(Arc::new(CalculateTool));
        let agent = ToolAgent::new(driver.clone(), tools, "sistema");

        let chunks: Vec<MessageChunk> = agent
            .stream(vec![Message::user("6 por 7")])
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content_blocks[0]["type"], "tool_call");
        assert_eq!(chunks[0].content_blocks[0]["name"], "calculate");
        assert_eq!(chunks[1], MessageChunk::tool_output("Resultado: 42"));
        assert_eq!(chunks[2], MessageChunk::text("Son 42"));

        let requests = driver.requests.lock().unwrap();
        let second = &requests[1];
        assert_eq!(second[2]["tool_calls"][0]["function"]["name"], "calculate");
        assert_eq!(second[3]["role"], "tool");
        assert_eq!(second[3]["content"], "Resultado: 42");
    }

    #[tokio::test]
    async fn test_unknown_tool_reports_error_to_model() {
        let driver = Arc::new(ScriptedDriver::new(vec![
            vec![LlmEvent::ToolCallComplete {
                call_index: 0,
                id: "call_1".to_string(),
                name: "missing".to_string(),
                arguments_json: "not json".to_string(),
            }],
            vec![text("ok")],
        ]));
        let agent = ToolAgent::new(driver, ToolRegistry::new_empty(), "sistema");

        let chunks: Vec<MessageChunk> = agent
            .stream(vec![Message::user("x")])
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(chunks[0].content_blocks[0]["args"], serde_json::json!({}));
        let output = chunks[1].content_blocks[0]["text"].as_str().unwrap();
        assert!(output.starts_with("Error: "));
    }

    #[tokio::test]
    async fn test_driver_failure_surfaces_as_stream_error() {
        let driver = Arc::new(ScriptedDriver::new(Vec::new()));
        let agent = ToolAgent::new(driver, ToolRegistry::new_empty(), "sistema");

        let result: anyhow::Result<Vec<MessageChunk>> = agent
            .stream(vec![Message::user("x")])
            .await
            .unwrap()
            .try_collect()
            .await;
        assert!(result.is_err());
    }
}
