//! DocuChat
//!
//! A conversational assistant that answers questions about the documents a
//! user uploads, and falls back to a tool-calling agent otherwise.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP server; chat answers stream over SSE
//! - **Agent**: tool-calling loop over an OpenAI-compatible Chat Completions API
//! - **RAG**: query rewriting, retrieval and grounded answers with citations
//! - **Ingestion**: partition, clean, chunk and embed uploads per session
//!
//! # Modules
//!
//! - [`llm`]: LLM driver trait and the Chat Completions implementation
//! - [`agent`]: tool-calling agent and prompts
//! - [`tools`]: calculator and web search tools
//! - [`rag`]: documents, embeddings, vector store and the retrieval chain
//! - [`ingest`]: upload batch processing
//! - [`stream`]: the text relays feeding the chat response
//! - [`session`]: per-user conversation state

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod agent;
pub mod backend;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod rag;
pub mod server;
pub mod session;
pub mod stream;
pub mod tools;

use std::sync::Arc;

use backend::ModelBackend;
use config::AppConfig;
use error::AppError;
use ingest::Ingestor;
use session::{Session, SessionStore};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Global Configuration
    pub config: Arc<AppConfig>,
    /// Live sessions by id.
    pub sessions: SessionStore,
    /// Builds the agent and RAG chain for a turn.
    pub backend: Arc<dyn ModelBackend>,
    pub ingestor: Arc<Ingestor>,
    /// Used when a session has not supplied its own key.
    pub default_api_key: Option<String>,
}

impl AppState {
    pub fn session(&self, id: &str) -> Result<Session, AppError> {
        self.sessions
            .get(id)
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))
    }

    /// API key for a turn of `session`.
    pub fn api_key_for(&self, session: &Session) -> Result<String, AppError> {
        session
            .api_key()
            .or_else(|| self.default_api_key.clone())
            .ok_or(AppError::MissingApiKey)
    }
}
