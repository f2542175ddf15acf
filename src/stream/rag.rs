//! RAG streaming: relay the answer, then append the cited sources.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::anyhow;
use futures::{Stream, StreamExt};

use crate::rag::{RagChain, RagChunk};
use crate::session::Session;

/// Number of most recent messages sent to the chain.
pub const DEFAULT_HISTORY_WINDOW: usize = 6;

/// Prefix of the trailing citation block.
pub const SOURCES_HEADER: &str = "\n\n**Fuentes:** ";

/// Render citation labels in sorted order.
#[must_use]
pub fn format_sources(sources: &BTreeSet<String>) -> String {
    let labels: Vec<&str> = sources.iter().map(String::as_str).collect();
    format!("{SOURCES_HEADER}{}", labels.join(", "))
}

/// Stream an answer grounded in the session's documents.
///
/// Only the last `history_window` messages (at least one) are used: the final one is the
/// question, the rest are prior turns. Sources are taken from the first
/// chunk carrying context; context arriving after any answer fragment is
/// ignored. When sources were found, a `**Fuentes:**` fragment closes the
/// stream. The full answer, including that fragment, is stored as one
/// assistant message once the chain completes.
pub fn rag_stream(
    chain: Arc<dyn RagChain>,
    session: Session,
    history_window: usize,
) -> impl Stream<Item = anyhow::Result<String>> + Send + 'static {
    async_stream::try_stream! {
        let (prior, input) = {
            let history = session.messages();
            let start = history.len().saturating_sub(history_window.max(1));
            let (last, prior) = history[start..]
                .split_last()
                .ok_or_else(|| anyhow!("conversation has no messages"))?;
            (prior.to_vec(), last.content.clone())
        };

        let mut upstream = chain.stream(prior, input).await?;
        let mut transcript = String::new();
        let mut sources: BTreeSet<String> = BTreeSet::new();
        let mut context_seen = false;
        let mut answered = false;

        while let Some(chunk) = upstream.next().await {
            let RagChunk { context, answer } = chunk.inspect_err(|e| {
                tracing::warn!(
                    session_id = %session.id(),
                    error = %e,
                    partial_length = transcript.len(),
                    "RAG stream failed, discarding partial transcript"
                );
            })?;

            if let Some(documents) = context {
                if answered {
                    tracing::warn!(session_id = %session.id(), "Ignoring context received after the answer started");
                } else if !context_seen {
                    context_seen = true;
                    sources.extend(documents.iter().filter_map(|doc| doc.citation_label()));
                    tracing::debug!(session_id = %session.id(), documents = documents.len(), sources = sources.len(), "Captured sources");
                }
            }

            if let Some(answer) = answer {
                answered = true;
                transcript.push_str(&answer);
                yield answer;
            }
        }

        if !sources.is_empty() {
            let citation = format_sources(&sources);
            transcript.push_str(&citation);
            yield citation;
        }

        tracing::debug!(session_id = %session.id(), length = transcript.len(), "RAG stream complete");
        session.add_assistant_message(transcript);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::testing::ScriptedChain;
    use crate::rag::{Document, DocumentMetadata};
    use crate::session::SessionStore;
    use futures::TryStreamExt;

    fn doc(source: &str, page: Option<u32>) -> Document {
        Document::new(
            "contenido",
            DocumentMetadata {
                source: source.to_string(),
                page_number: page,
                ..DocumentMetadata::default()
            },
        )
    }

    #[tokio::test]
    async fn test_answer_then_sources() {
        let session = SessionStore::new().create();
        session.add_user_message("¿Qué dice?");
        let chain = Arc::new(ScriptedChain::new(vec![
            RagChunk::context(vec![doc("doc1.pdf", Some(1))]),
            RagChunk::answer("Esta es "),
            RagChunk::answer("la respuesta"),
        ]));

        let fragments: Vec<String> = rag_stream(chain, session.clone(), DEFAULT_HISTORY_WINDOW)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(
            fragments,
            vec!["Esta es ", "la respuesta", "\n\n**Fuentes:** doc1.pdf (pag.1)"]
        );
        assert_eq!(session.messages()[1].content, fragments.concat());
    }

    #[test]
    fn test_sources_sorted_and_deduplicated() {
        let sources: BTreeSet<String> = ["b.pdf", "a.pdf", "b.pdf"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(format_sources(&sources), "\n\n**Fuentes:** a.pdf, b.pdf");
    }

    #[tokio::test]
    async fn test_only_first_context_counts() {
        let session = SessionStore::new().create();
        session.add_user_message("q");
        let chain = Arc::new(ScriptedChain::new(vec![
            RagChunk::context(vec![doc("a.md", None), doc("a.md", None)]),
            RagChunk::context(vec![doc("otro.pdf", Some(3))]),
            RagChunk::answer("r"),
            RagChunk::context(vec![doc("tarde.pdf", Some(9))]),
        ]));

        let fragments: Vec<String> = rag_stream(chain, session, DEFAULT_HISTORY_WINDOW)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(fragments, vec!["r", "\n\n**Fuentes:** a.md"]);
    }

    #[tokio::test]
    async fn test_no_sources_no_suffix() {
        let session = SessionStore::new().create();
        session.add_user_message("q");
        let chain = Arc::new(ScriptedChain::new(vec![
            RagChunk::context(Vec::new()),
            RagChunk::answer("sin fuentes"),
        ]));

        let fragments: Vec<String> = rag_stream(chain, session.clone(), DEFAULT_HISTORY_WINDOW)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(fragments, vec!["sin fuentes"]);
        assert_eq!(session.messages()[1].content, "sin fuentes");
    }

    #[tokio::test]
    async fn test_history_window() {
        let session = SessionStore::new().create();
        for i in 0..9 {
            session.add_user_message(format!("m{i}"));
        }
        let chain = Arc::new(ScriptedChain::new(vec![RagChunk::answer("ok")]));

        let _: Vec<String> = rag_stream(chain.clone(), session, DEFAULT_HISTORY_WINDOW)
            .try_collect()
            .await
            .unwrap();

        let calls = chain.calls.lock().unwrap();
        let (prior, input) = &calls[0];
        assert_eq!(input, "m8");
        assert_eq!(prior.len(), 5);
        assert_eq!(prior[0].content, "m3");
    }

    #[tokio::test]
    async fn test_zero_window_still_sends_question() {
        let session = SessionStore::new().create();
        session.add_user_message("antes");
        session.add_user_message("pregunta");
        let chain = Arc::new(ScriptedChain::new(vec![RagChunk::answer("ok")]));

        let fragments: Vec<String> = rag_stream(chain.clone(), session, 0)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(fragments, vec!["ok"]);

        let calls = chain.calls.lock().unwrap();
        assert_eq!(calls[0].1, "pregunta");
        assert!(calls[0].0.is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_not_stored() {
        let session = SessionStore::new().create();
        session.add_user_message("q");
        let chain = Arc::new(ScriptedChain::failing(
            vec![RagChunk::answer("parcial")],
            "timeout",
        ));

        let items: Vec<anyhow::Result<String>> =
            rag_stream(chain, session.clone(), DEFAULT_HISTORY_WINDOW).collect().await;
        assert!(items.last().unwrap().is_err());
        assert_eq!(session.message_count(), 1);
    }
}
