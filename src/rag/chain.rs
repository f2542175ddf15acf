//! Conversational retrieval chain.
//!
//! A history-aware retriever rewrites the question into a standalone search
//! query (only when there are prior turns), fetches the top-k chunks, and a
//! stuff-documents step answers from them.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};

use super::document::Document;
use super::vector_store::Retriever;
use crate::agent::prompt::{QUERY_REWRITE_INSTRUCTION, rag_system_prompt};
use crate::llm::{LlmDriver, LlmEvent, LlmRequest, Message, complete_text};

/// Partial chain output: retrieved context, an answer fragment, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RagChunk {
    pub context: Option<Vec<Document>>,
    pub answer: Option<String>,
}

impl RagChunk {
    #[must_use]
    pub fn context(documents: Vec<Document>) -> Self {
        Self {
            context: Some(documents),
            answer: None,
        }
    }

    #[must_use]
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            context: None,
            answer: Some(text.into()),
        }
    }
}

pub type RagChunkStream = Pin<Box<dyn Stream<Item = anyhow::Result<RagChunk>> + Send>>;

/// A retrieval-augmented answer pipeline.
#[async_trait::async_trait]
pub trait RagChain: Send + Sync {
    /// Answer `input` given the `prior` conversation turns.
    async fn stream(&self, prior: Vec<Message>, input: String) -> anyhow::Result<RagChunkStream>;
}

/// Default chain: query rewrite, retrieval, then a streamed answer.
#[derive(Clone)]
pub struct ConversationalRagChain {
    driver: Arc<dyn LlmDriver>,
    retriever: Retriever,
}

impl std::fmt::Debug for ConversationalRagChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationalRagChain")
            .field("retriever", &self.retriever)
            .finish()
    }
}

impl ConversationalRagChain {
    #[must_use]
    pub fn new(driver: Arc<dyn LlmDriver>, retriever: Retriever) -> Self {
        Self { driver, retriever }
    }
}

/// Join retrieved passages into the prompt context.
fn stuff_documents(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|d| d.page_content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait::async_trait]
impl RagChain for ConversationalRagChain {
    async fn stream(&self, prior: Vec<Message>, input: String) -> anyhow::Result<RagChunkStream> {
        let chain = self.clone();

        let stream = async_stream::try_stream! {
            let query = if prior.is_empty() {
                input.clone()
            } else {
                let mut rewrite: Vec<Message> = prior.clone();
                rewrite.push(Message::user(&input));
                rewrite.push(Message::user(QUERY_REWRITE_INSTRUCTION));
                complete_text(chain.driver.as_ref(), LlmRequest::from_messages(&rewrite)).await?
            };
            tracing::debug!(query = %query, "Retrieving context");

            let documents = chain.retriever.invoke(&query).await?;
            let context = stuff_documents(&documents);
            yield RagChunk::context(documents);

            let mut messages = Vec::with_capacity(prior.len() + 2);
            messages.push(Message::system(rag_system_prompt(&context)));
            messages.extend(prior);
            messages.push(Message::user(input));

            let mut answer = chain.driver.stream(LlmRequest::from_messages(&messages)).await?;
            while let Some(event) = answer.next().await {
                if let LlmEvent::TextDelta { text } = event? {
                    yield RagChunk::answer(text);
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
