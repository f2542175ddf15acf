//! OpenAI Chat Completions API driver.
//!
//! This module implements the [`LlmDriver`] trait for OpenAI-compatible
//! `chat/completions` endpoints, supporting streaming responses and tool calls.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::StreamExt;

use super::{LlmDriver, LlmEvent, LlmEventStream, LlmRequest, LlmSettings};

/// Base delay between request retries.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Accumulated state for a streaming tool call.
#[derive(Debug, Default)]
struct ToolAccum {
    id: Option<String>,
    name: Option<String>,
    args: String,
}

/// Driver for OpenAI-compatible Chat Completions APIs.
///
/// Streams responses as [`LlmEvent`]s.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ChatCompletionsDriver {
    /// Create a new Chat Completions driver with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    /// Send the request, retrying transport errors, 429 and 5xx responses.
    async fn send_with_retry(&self, body: &serde_json::Value) -> anyhow::Result<reqwest::Response> {
        let url = self.settings.provider.build_chat_url(&self.settings.base_url);
        let mut attempt = 0;

        loop {
            let mut rb = self.http.post(&url).json(body);
            if let Some(k) = &self.settings.api_key {
                rb = rb.bearer_auth(k);
            }

            let retryable = match rb.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    if status.as_u16() != 429 && !status.is_server_error() {
                        let text = resp.text().await.unwrap_or_default();
                        anyhow::bail!("LLM request failed ({status}): {text}");
                    }
                    anyhow::anyhow!("LLM request failed ({status})")
                }
                Err(e) => anyhow::Error::from(e),
            };

            if attempt >= self.settings.max_retries {
                return Err(retryable);
            }
            attempt += 1;

            tracing::warn!(
                attempt = attempt,
                max_retries = self.settings.max_retries,
                error = %retryable,
                "Retrying LLM request"
            );
            tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
        }
    }
}

#[async_trait::async_trait]
impl LlmDriver for ChatCompletionsDriver {
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<LlmEventStream> {
        let body = serde_json::json!({
            "model": self.settings.model,
            "stream": true,
            "temperature": self.settings.temperature,
            "messages": req.messages,
            "tools": if req.tools.is_empty() { serde_json::Value::Null } else { serde_json::Value::Array(req.tools) }
        });

        let resp = self.send_with_retry(&body).await?;
        let byte_stream = resp.bytes_stream();

        let out = async_stream::try_stream! {
            let mut buf = Vec::<u8>::new();
            let mut tool_accum: BTreeMap<usize, ToolAccum> = BTreeMap::new();

            futures::pin_mut!(byte_stream);
            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk?;
                buf.extend(chunk.iter().filter(|b| **b != b'\r'));

                while let Some(pos) = find_double_newline(&buf) {
                    let frame = buf.drain(..pos + 2).collect::<Vec<_>>();
                    let text = String::from_utf8_lossy(&frame);

                    for line in text.lines() {
                        let line = line.trim();
                        if !line.starts_with("data:") {
                            continue;
                        }
                        let data = line.trim_start_matches("data:").trim();

                        if data == "[DONE]" {
                            yield LlmEvent::Done;
                            continue;
                        }

                        let v: serde_json::Value = serde_json::from_str(data)?;
                        for event in parse_chunk(&v, &mut tool_accum) {
                            yield event;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(out))
    }
}

/// Translate one streamed `chat.completion.chunk` into driver events.
fn parse_chunk(v: &serde_json::Value, tool_accum: &mut BTreeMap<usize, ToolAccum>) -> Vec<LlmEvent> {
    let mut events = Vec::new();
    let choice = &v["choices"][0];
    let delta = &choice["delta"];

    if let Some(s) = delta.get("content").and_then(|x| x.as_str()) {
        if !s.is_empty() {
            events.push(LlmEvent::TextDelta {
                text: s.to_string(),
            });
        }
    }

    if let Some(arr) = delta.get("tool_calls").and_then(|x| x.as_array()) {
        for (position, tc) in arr.iter().enumerate() {
            // Gemini omits `index` when it sends several calls in one chunk.
            let idx = tc
                .get("index")
                .and_then(serde_json::Value::as_u64)
                .map_or(position, |i| i as usize);
            let id = tc.get("id").and_then(|x| x.as_str()).map(ToString::to_string);
            let function = tc.get("function");
            let name = function
                .and_then(|f| f.get("name"))
                .and_then(|x| x.as_str())
                .map(ToString::to_string);
            let args_delta = function
                .and_then(|f| f.get("arguments"))
                .and_then(|x| x.as_str())
                .map(ToString::to_string);

            let entry = tool_accum.entry(idx).or_default();
            if entry.id.is_none() {
                entry.id = id;
            }
            if entry.name.is_none() {
                entry.name = name;
            }
            if let Some(ad) = &args_delta {
                entry.args.push_str(ad);
            }
        }
    }

    // Some providers finish a tool turn with "stop", so any finish flushes.
    if choice.get("finish_reason").and_then(|x| x.as_str()).is_some() {
        for (idx, a) in std::mem::take(tool_accum) {
            if let Some(name) = a.name {
                events.push(LlmEvent::ToolCallComplete {
                    call_index: idx,
                    id: a.id.unwrap_or_else(|| format!("call_{idx}")),
                    name,
                    arguments_json: a.args,
                });
            }
        }
    }

    events
}

/// Find the position of a double newline in the buffer.
fn find_double_newline(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_delta() {
        let mut accum = BTreeMap::new();
        let events = parse_chunk(
            &json!({ "choices": [{ "delta": { "content": "Hola" } }] }),
            &mut accum,
        );
        assert_eq!(
            events,
            vec![LlmEvent::TextDelta {
                text: "Hola".to_string()
            }]
        );
    }

    #[test]
    fn test_tool_call_assembled_on_finish() {
        let mut accum = BTreeMap::new();
        let partial = parse_chunk(
            &json!({ "choices": [{ "delta": { "tool_calls": [
                { "index": 0, "id": "call_1", "function": { "name": "calculate", "arguments": "{\"expression\":" } }
            ] } }] }),
            &mut accum,
        );
        assert!(partial.is_empty());
        assert_eq!(accum.len(), 1);

        let events = parse_chunk(
            &json!({ "choices": [{ "delta": { "tool_calls": [
                { "index": 0, "function": { "arguments": "\"2+2\"}" } }
            ] }, "finish_reason": "tool_calls" }] }),
            &mut accum,
        );

        assert!(events.contains(&LlmEvent::ToolCallComplete {
            call_index: 0,
            id: "call_1".to_string(),
            name: "calculate".to_string(),
            arguments_json: "{\"expression\":\"2+2\"}".to_string(),
        }));
        assert!(accum.is_empty());
    }

    #[test]
    fn test_missing_index_uses_position() {
        let mut accum = BTreeMap::new();
        let events = parse_chunk(
            &json!({ "choices": [{ "delta": { "tool_calls": [
                { "id": "a", "function": { "name": "search", "arguments": "{}" } },
                { "id": "b", "function": { "name": "calculate", "arguments": "{}" } }
            ] }, "finish_reason": "stop" }] }),
            &mut accum,
        );
        let complete: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, LlmEvent::ToolCallComplete { .. }))
            .collect();
        assert_eq!(complete.len(), 2);
    }

    #[test]
    fn test_find_double_newline() {
        assert_eq!(find_double_newline(b"data: x\n\nrest"), Some(7));
        assert_eq!(find_double_newline(b"data: x\n"), None);
    }
}
