//! Local partitioning, no network.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::extract::{docx_paragraphs, pdf_pages};
use super::{Element, ElementMetadata, PartitionError, Partitioner, mime_type_of};

const PDF_MIME: &str = "application/pdf";
const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Splits uploads into paragraph elements.
///
/// Text and markdown split on blank lines. PDF text is split per page and
/// each element carries its page number. Word documents yield one element
/// per paragraph.
#[derive(Debug, Default)]
pub struct LocalPartitioner;

impl LocalPartitioner {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Paragraphs separated by one or more blank lines.
fn split_paragraphs(content: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
}

/// Run a blocking extractor off the async runtime.
async fn run_blocking<T, F>(path: &Path, extract: F) -> Result<T, PartitionError>
where
    T: Send + 'static,
    F: FnOnce(PathBuf) -> Result<T, PartitionError> + Send + 'static,
{
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || extract(path))
        .await
        .map_err(|e| PartitionError::Provider(format!("la extracción falló: {e}")))?
}

async fn read_text(path: &Path) -> Result<String, PartitionError> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::InvalidData {
            PartitionError::UnsupportedType(format!(
                "el archivo no es texto UTF-8 válido: {}",
                path.display()
            ))
        } else {
            PartitionError::Io(e)
        }
    })
}

#[async_trait]
impl Partitioner for LocalPartitioner {
    async fn partition(&self, path: &Path) -> Result<Vec<Element>, PartitionError> {
        let mime_type = mime_type_of(path);
        if !self.supports_mime_type(&mime_type) {
            return Err(PartitionError::UnsupportedType(mime_type));
        }

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(ToString::to_string);
        let metadata = |page_number: Option<u32>| ElementMetadata {
            page_number,
            filetype: Some(mime_type.clone()),
            filename: filename.clone(),
            languages: Vec::new(),
        };

        let elements: Vec<Element> = match mime_type.as_str() {
            PDF_MIME => run_blocking(path, |p| pdf_pages(&p))
                .await?
                .into_iter()
                .flat_map(|(page, text)| {
                    split_paragraphs(&text)
                        .into_iter()
                        .map(move |paragraph| (page, paragraph))
                })
                .map(|(page, paragraph)| Element::new(paragraph, metadata(Some(page))))
                .collect(),
            DOCX_MIME => run_blocking(path, |p| docx_paragraphs(&p))
                .await?
                .into_iter()
                .map(|paragraph| Element::new(paragraph, metadata(None)))
                .collect(),
            _ => split_paragraphs(&read_text(path).await?)
                .into_iter()
                .map(|paragraph| Element::new(paragraph, metadata(None)))
                .collect(),
        };

        tracing::debug!(path = %path.display(), elements = elements.len(), "Partitioned file locally");
        Ok(elements)
    }

    fn supports_mime_type(&self, mime_type: &str) -> bool {
        matches!(
            mime_type,
            "text/plain" | "text/markdown" | "text/x-markdown" | PDF_MIME | DOCX_MIME
        )
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}
