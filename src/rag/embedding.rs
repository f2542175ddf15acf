//! Text embedding backends.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;
use tracing::info;

/// Turns text into vectors for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync + std::fmt::Debug {
    /// Embed passages for storage.
    async fn embed_documents(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Local ONNX embeddings through fastembed (multilingual E5, small).
///
/// The model is loaded lazily on first use and runs on the blocking pool.
pub struct FastEmbedder {
    model: Arc<Mutex<Option<TextEmbedding>>>,
    show_download_progress: bool,
}

impl std::fmt::Debug for FastEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedder")
            .field("model", &"multilingual-e5-small")
            .finish()
    }
}

impl Default for FastEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl FastEmbedder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: Arc::new(Mutex::new(None)),
            show_download_progress: true,
        }
    }

    /// Load the model now instead of on the first request.
    pub async fn initialize(&self) -> Result<()> {
        let mut model_guard = self.model.lock().await;
        if model_guard.is_none() {
            *model_guard = Some(self.load().await?);
        }
        Ok(())
    }

    async fn load(&self) -> Result<TextEmbedding> {
        info!("Initializing fastembed model (multilingual-e5-small)...");
        let mut options = InitOptions::new(EmbeddingModel::MultilingualE5Small);
        options.show_download_progress = self.show_download_progress;
        tokio::task::spawn_blocking(move || TextEmbedding::try_new(options))
            .await?
            .context("failed to load embedding model")
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut model_guard = self.model.lock().await;
        let mut owned_model = match model_guard.take() {
            Some(model) => model,
            None => self.load().await?,
        };

        let (embeddings_res, returned_model) = tokio::task::spawn_blocking(move || {
            let res = owned_model.embed(texts, None);
            (res, owned_model)
        })
        .await?;

        *model_guard = Some(returned_model);
        embeddings_res.map_err(|e| anyhow::anyhow!(e))
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed_documents(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        // E5 models expect role prefixes.
        self.embed(texts.into_iter().map(|t| format!("passage: {t}")).collect())
            .await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(vec![format!("query: {text}")])
            .await?
            .pop()
            .context("embedding model returned no vector")
    }
}

/// Feature-hashing bag-of-words embedder.
///
/// No model download and fully deterministic; retrieval quality is lexical
/// only.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let hash = hasher.finish();
            let index = (hash % self.dimensions as u64) as usize;
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed_documents(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }
}

/// Cosine similarity; zero when either vector is null.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hashing_is_deterministic_and_case_insensitive() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed_query("Contrato de Arriendo").await.unwrap();
        let b = embedder.embed_query("contrato de arriendo").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
    }

    #[tokio::test]
    async fn test_hashing_ranks_lexical_overlap() {
        let embedder = HashingEmbedder::default();
        let docs = embedder
            .embed_documents(vec![
                "el gato duerme en el sofá".to_string(),
                "impuestos y contabilidad anual".to_string(),
            ])
            .await
            .unwrap();
        let query = embedder.embed_query("contabilidad anual").await.unwrap();
        assert!(cosine_similarity(&query, &docs[1]) > cosine_similarity(&query, &docs[0]));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
