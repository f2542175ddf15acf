//! Element-aware chunking.
//!
//! Consecutive elements are packed into chunks of at most `max_characters`
//! characters, joined by blank lines. An element that is larger on its own
//! is split with `text-splitter`. Each chunk keeps the metadata of its first
//! element, with the languages of all its elements merged.

use text_splitter::{Characters, ChunkConfig, TextSplitter};

use super::partition::{Element, ElementMetadata};

/// Separator placed between elements packed into one chunk.
const ELEMENT_SEPARATOR: &str = "\n\n";

/// Default chunk size in characters.
pub const DEFAULT_MAX_CHARACTERS: usize = 500;

/// A chunk of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ElementMetadata,
}

#[derive(Debug, Clone)]
pub struct ElementChunker {
    max_characters: usize,
}

impl Default for ElementChunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARACTERS)
    }
}

struct Pending {
    text: String,
    chars: usize,
    metadata: ElementMetadata,
}

impl Pending {
    fn start(text: &str, metadata: &ElementMetadata) -> Self {
        Self {
            text: text.to_string(),
            chars: text.chars().count(),
            metadata: metadata.clone(),
        }
    }

    fn push(&mut self, text: &str, metadata: &ElementMetadata) {
        self.text.push_str(ELEMENT_SEPARATOR);
        self.text.push_str(text);
        self.chars += ELEMENT_SEPARATOR.len() + text.chars().count();
        for language in &metadata.languages {
            if !self.metadata.languages.contains(language) {
                self.metadata.languages.push(language.clone());
            }
        }
    }

    fn finish(self) -> Chunk {
        Chunk {
            text: self.text,
            metadata: self.metadata,
        }
    }
}

impl ElementChunker {
    #[must_use]
    pub fn new(max_characters: usize) -> Self {
        Self {
            max_characters: max_characters.max(1),
        }
    }

    /// Chunk elements in order. Elements with empty text are skipped.
    #[must_use]
    pub fn chunk_elements(&self, elements: &[Element]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut pending: Option<Pending> = None;

        for element in elements {
            let text = element.text.as_str();
            if text.trim().is_empty() {
                continue;
            }
            let chars = text.chars().count();

            if chars > self.max_characters {
                chunks.extend(pending.take().map(Pending::finish));
                chunks.extend(self.split_oversized(text).into_iter().map(|piece| Chunk {
                    text: piece,
                    metadata: element.metadata.clone(),
                }));
                continue;
            }

            pending = Some(match pending.take() {
                Some(mut current)
                    if current.chars + ELEMENT_SEPARATOR.len() + chars <= self.max_characters =>
                {
                    current.push(text, &element.metadata);
                    current
                }
                Some(current) => {
                    chunks.push(current.finish());
                    Pending::start(text, &element.metadata)
                }
                None => Pending::start(text, &element.metadata),
            });
        }

        chunks.extend(pending.map(Pending::finish));
        chunks
    }

    fn split_oversized(&self, text: &str) -> Vec<String> {
        let config = ChunkConfig::new(self.max_characters)
            .with_sizer(Characters)
            .with_trim(true);
        let splitter = TextSplitter::new(config);
        splitter.chunks(text).map(|s: &str| s.to_string()).collect()
    }
}
