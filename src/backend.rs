//! Construction of the per-request agent and RAG chain.

use std::sync::Arc;

use chrono::Local;

use crate::agent::prompt::{agent_system_prompt, spanish_long_date};
use crate::agent::{ChatAgent, ToolAgent};
use crate::llm::{ChatCompletionsDriver, LlmDriver, LlmSettings};
use crate::rag::{ConversationalRagChain, RagChain, Retriever, VectorStore};
use crate::tools::ToolRegistry;

/// Builds the models a chat turn talks to, bound to the caller's API key.
pub trait ModelBackend: Send + Sync {
    /// General agent with the DocuChat tools.
    fn chat_agent(&self, api_key: &str) -> Arc<dyn ChatAgent>;

    /// Retrieval chain over the session's store.
    fn rag_chain(&self, api_key: &str, store: Arc<VectorStore>) -> Arc<dyn RagChain>;
}

/// Backend talking to an OpenAI-compatible Chat Completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionsBackend {
    settings: LlmSettings,
    tools: ToolRegistry,
    retriever_k: usize,
}

impl ChatCompletionsBackend {
    #[must_use]
    pub fn new(settings: LlmSettings, tools: ToolRegistry, retriever_k: usize) -> Self {
        Self {
            settings,
            tools,
            retriever_k,
        }
    }

    fn driver(&self, api_key: &str) -> Arc<dyn LlmDriver> {
        Arc::new(ChatCompletionsDriver::new(self.settings.with_api_key(api_key)))
    }
}

impl ModelBackend for ChatCompletionsBackend {
    fn chat_agent(&self, api_key: &str) -> Arc<dyn ChatAgent> {
        let today = spanish_long_date(&Local::now());
        Arc::new(ToolAgent::new(
            self.driver(api_key),
            self.tools.clone(),
            agent_system_prompt(&today),
        ))
    }

    fn rag_chain(&self, api_key: &str, store: Arc<VectorStore>) -> Arc<dyn RagChain> {
        Arc::new(ConversationalRagChain::new(
            self.driver(api_key),
            Retriever::new(store, self.retriever_k),
        ))
    }
}
