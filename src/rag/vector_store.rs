//! Per-session in-memory vector store.

use std::sync::Arc;

use anyhow::{Result, ensure};
use chrono::Utc;
use tokio::sync::RwLock;

use super::document::Document;
use super::embedding::{Embedder, cosine_similarity};

#[derive(Debug, Clone)]
struct Entry {
    document: Document,
    embedding: Vec<f32>,
}

/// Embedded documents of one session, searchable by cosine similarity.
#[derive(Debug)]
pub struct VectorStore {
    collection: String,
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<Entry>>,
}

impl VectorStore {
    /// Collection name for a new store: creation time in milliseconds plus
    /// the session id.
    #[must_use]
    pub fn collection_name(session_id: &str) -> String {
        format!("{}_{}", Utc::now().timestamp_millis(), session_id)
    }

    /// Create a store and embed the initial documents into it.
    pub async fn from_documents(
        collection: String,
        documents: Vec<Document>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let store = Self {
            collection,
            embedder,
            entries: RwLock::new(Vec::new()),
        };
        store.add_documents(documents).await?;
        Ok(store)
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Embed and append documents. Returns the number added.
    pub async fn add_documents(&self, documents: Vec<Document>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let texts = documents.iter().map(|d| d.page_content.clone()).collect();
        let embeddings = self.embedder.embed_documents(texts).await?;
        ensure!(
            embeddings.len() == documents.len(),
            "embedder returned {} vectors for {} documents",
            embeddings.len(),
            documents.len()
        );

        let added = documents.len();
        let mut entries = self.entries.write().await;
        entries.extend(
            documents
                .into_iter()
                .zip(embeddings)
                .map(|(document, embedding)| Entry { document, embedding }),
        );

        tracing::info!(
            collection = %self.collection,
            added = added,
            total = entries.len(),
            "Upserted documents"
        );
        Ok(added)
    }

    /// The `k` documents most similar to `query`, best first.
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        if k == 0 || self.is_empty().await {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed_query(query).await?;
        let entries = self.entries.read().await;

        let mut scored: Vec<(f32, &Entry)> = entries
            .iter()
            .map(|entry| (cosine_similarity(&query_embedding, &entry.embedding), entry))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, entry)| entry.document.clone())
            .collect())
    }
}

/// Fixed-`k` similarity retriever over a store.
#[derive(Debug, Clone)]
pub struct Retriever {
    store: Arc<VectorStore>,
    k: usize,
}

impl Retriever {
    #[must_use]
    pub fn new(store: Arc<VectorStore>, k: usize) -> Self {
        Self { store, k }
    }

    pub async fn invoke(&self, query: &str) -> Result<Vec<Document>> {
        self.store.similarity_search(query, self.k).await
    }
}
