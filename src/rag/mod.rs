//! Retrieval over the documents a session uploaded.
//!
//! - [`document`]: chunk records and their metadata
//! - [`embedding`]: embedding backends
//! - [`vector_store`]: per-session store and retriever
//! - [`chain`]: the conversational retrieval chain

pub mod chain;
pub mod document;
pub mod embedding;
pub mod vector_store;

pub use chain::{ConversationalRagChain, RagChain, RagChunk, RagChunkStream};
pub use document::{Document, DocumentMetadata, NONE_SENTINEL};
pub use embedding::{Embedder, FastEmbedder, HashingEmbedder, cosine_similarity};
pub use vector_store::{Retriever, VectorStore};
