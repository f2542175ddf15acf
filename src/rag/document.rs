//! Document records stored in the vector store.

use serde::{Deserialize, Serialize};

/// Placeholder stored when a metadata value is unknown.
pub const NONE_SENTINEL: &str = "None";

/// One retrievable chunk of an uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    pub metadata: DocumentMetadata,
}

/// Normalized chunk metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Uploaded filename the chunk came from.
    pub source: String,
    /// Zero-based chunk index within the source.
    pub chunk_id: usize,
    /// Page of the chunk's first element; serialized as `"None"` when absent.
    #[serde(with = "page_number")]
    pub page_number: Option<u32>,
    pub filetype: String,
    pub filename: String,
    /// Comma-joined detected languages.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub languages: Option<String>,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            source: String::new(),
            chunk_id: 0,
            page_number: None,
            filetype: NONE_SENTINEL.to_string(),
            filename: NONE_SENTINEL.to_string(),
            languages: None,
        }
    }
}

impl Document {
    #[must_use]
    pub fn new(page_content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            page_content: page_content.into(),
            metadata,
        }
    }

    /// Citation label: `source` or `source (pag.N)`. `None` without a source.
    #[must_use]
    pub fn citation_label(&self) -> Option<String> {
        let source = self.metadata.source.trim();
        if source.is_empty() {
            return None;
        }
        Some(match self.metadata.page_number {
            Some(page) => format!("{source} (pag.{page})"),
            None => source.to_string(),
        })
    }
}

mod page_number {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::NONE_SENTINEL;

    pub fn serialize<S: Serializer>(value: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(page) => serializer.serialize_u32(*page),
            None => serializer.serialize_str(NONE_SENTINEL),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
        Null(()),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(page) => Some(page),
            Raw::Text(text) if text != NONE_SENTINEL => text.trim().parse().ok(),
            Raw::Text(_) | Raw::Null(()) => None,
        })
    }
}
