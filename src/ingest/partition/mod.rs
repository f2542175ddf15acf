//! Document partitioning into structural elements.
//!
//! A [`Partitioner`] reads a stored upload and returns its elements (titles,
//! paragraphs, list items, ...) with per-element metadata. Two backends are
//! available:
//!
//! - [`LocalPartitioner`]: text, markdown, PDF (per page) and Word, no network
//! - [`UnstructuredPartitioner`]: every supported format through an
//!   Unstructured API deployment
//!
//! [`partitioner_from_config`] picks the backend from configuration.

mod extract;
mod local;
mod unstructured;

pub use local::LocalPartitioner;
pub use unstructured::UnstructuredPartitioner;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::PartitionConfig;

/// One structural element of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub text: String,
    #[serde(default)]
    pub metadata: ElementMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementMetadata {
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub filetype: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
}

impl Element {
    #[must_use]
    pub fn new(text: impl Into<String>, metadata: ElementMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// Errors that can occur while partitioning a file.
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    /// The file type is not supported by this partitioner.
    #[error("tipo de archivo no soportado: {0}")]
    UnsupportedType(String),

    /// The partitioning service rejected or failed the request.
    #[error("error del servicio de particionado: {0}")]
    Provider(String),

    /// An I/O error occurred while reading the file.
    #[error("error de E/S: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request error.
    #[error("error HTTP: {0}")]
    Http(String),
}

/// Splits a stored file into elements.
#[async_trait]
pub trait Partitioner: Send + Sync + std::fmt::Debug {
    async fn partition(&self, path: &Path) -> Result<Vec<Element>, PartitionError>;

    fn supports_mime_type(&self, mime_type: &str) -> bool;

    /// Backend name for logging.
    fn provider_name(&self) -> &'static str;
}

/// MIME type guessed from the path's extension.
#[must_use]
pub fn mime_type_of(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

/// Build the partitioner selected by configuration.
///
/// The Unstructured backend is used whenever an API URL is configured;
/// otherwise files are partitioned locally.
#[must_use]
pub fn partitioner_from_config(config: &PartitionConfig) -> Arc<dyn Partitioner> {
    match config.unstructured_api_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => {
            tracing::info!(api_url = %url, "Using Unstructured API for partitioning");
            Arc::new(UnstructuredPartitioner::new(
                url.to_string(),
                config.unstructured_api_key.clone(),
            ))
        }
        None => {
            tracing::info!("Using local partitioning");
            Arc::new(LocalPartitioner::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_selection() {
        let local = partitioner_from_config(&PartitionConfig::default());
        assert_eq!(local.provider_name(), "local");

        let remote = partitioner_from_config(&PartitionConfig {
            unstructured_api_url: Some("http://localhost:8000/general/v0/general".to_string()),
            unstructured_api_key: None,
        });
        assert_eq!(remote.provider_name(), "unstructured");
    }

    #[test]
    fn test_mime_type_of() {
        assert_eq!(mime_type_of(Path::new("a.pdf")), "application/pdf");
        assert_eq!(mime_type_of(Path::new("a.txt")), "text/plain");
    }
}
