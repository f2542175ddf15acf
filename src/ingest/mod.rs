//! Document ingestion: partition, clean, chunk, embed and upsert.
//!
//! [`Ingestor::load_documents`] processes one upload batch for a session:
//!
//! 1. Reject empty batches and sessions already at the document cap
//! 2. Skip files whose name was already ingested (or repeats in the batch)
//! 3. Store each new file in the session's upload folder, partition it,
//!    clean every element and chunk the result into [`Document`]s
//! 4. Remove the upload folder (also when the batch is cancelled)
//! 5. Upsert the documents into the session's vector store, creating it on
//!    first use, and register the filenames
//!
//! Per-file failures are reported as toasts and never abort the batch.

pub mod chunking;
pub mod clean;
pub mod partition;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

use crate::error::AppError;
use crate::rag::{Document, DocumentMetadata, Embedder, NONE_SENTINEL, VectorStore};
use crate::session::Session;
use crate::stream::{Notifier, Toast};
use chunking::{Chunk, ElementChunker};
use partition::Partitioner;

/// File extensions accepted for upload.
pub const ALLOWED_EXTENSIONS: &[&str] = &["txt", "md", "pdf", "docx"];

/// Default maximum number of documents per session.
pub const DEFAULT_MAX_DOCUMENTS: usize = 10;

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    #[must_use]
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// A file that could not be ingested.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub filename: String,
    pub error: String,
}

/// Outcome of one upload batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Files ingested by this batch.
    pub added: Vec<String>,
    /// Files skipped because a file with the same name was already ingested.
    pub skipped: Vec<String>,
    pub failed: Vec<FileFailure>,
    /// Chunks written to the vector store.
    pub chunks: usize,
}

/// Ingestion limits and locations.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub max_documents: usize,
    pub chunk_max_characters: usize,
    /// Parent directory of the per-session upload folders.
    pub upload_root: PathBuf,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_documents: DEFAULT_MAX_DOCUMENTS,
            chunk_max_characters: chunking::DEFAULT_MAX_CHARACTERS,
            upload_root: PathBuf::from("."),
        }
    }
}

/// Ingests upload batches into per-session vector stores.
#[derive(Debug)]
pub struct Ingestor {
    partitioner: Arc<dyn Partitioner>,
    embedder: Arc<dyn Embedder>,
    chunker: ElementChunker,
    options: IngestOptions,
}

impl Ingestor {
    #[must_use]
    pub fn new(
        partitioner: Arc<dyn Partitioner>,
        embedder: Arc<dyn Embedder>,
        options: IngestOptions,
    ) -> Self {
        Self {
            partitioner,
            embedder,
            chunker: ElementChunker::new(options.chunk_max_characters),
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Upload folder of a session.
    #[must_use]
    pub fn session_folder(&self, session_id: &str) -> PathBuf {
        self.options
            .upload_root
            .join(format!("source_files_{session_id}"))
    }

    /// Ingest one upload batch into the session.
    ///
    /// # Errors
    ///
    /// [`AppError::NoDocuments`] for an empty batch,
    /// [`AppError::TooManyDocuments`] when the session is at the cap (both
    /// before touching the file system), and [`AppError::Internal`] when the
    /// upload folder cannot be created or the vector store upsert fails.
    pub async fn load_documents(
        &self,
        session: &Session,
        files: Vec<UploadedFile>,
        notifier: &dyn Notifier,
    ) -> Result<IngestReport, AppError> {
        if files.is_empty() {
            return Err(AppError::NoDocuments);
        }
        if session.document_count() >= self.options.max_documents {
            return Err(AppError::TooManyDocuments {
                max: self.options.max_documents,
            });
        }

        let upload_dir = UploadDir::create(self.session_folder(session.id())).await?;

        let mut report = IngestReport::default();
        let mut documents: Vec<Document> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for file in files {
            if session.has_source(&file.filename) || !seen.insert(file.filename.clone()) {
                tracing::debug!(session_id = %session.id(), filename = %file.filename, "Skipping already ingested file");
                report.skipped.push(file.filename);
                continue;
            }

            match self.process_file(upload_dir.path(), &file).await {
                Ok(mut docs) => {
                    tracing::info!(
                        session_id = %session.id(),
                        filename = %file.filename,
                        chunks = docs.len(),
                        "Processed document"
                    );
                    documents.append(&mut docs);
                    report.added.push(file.filename);
                }
                Err(e) => {
                    tracing::warn!(session_id = %session.id(), filename = %file.filename, error = %e, "Failed to process document");
                    notifier.notify(Toast::error(format!(
                        "Error al procesar el documento {}: {e}",
                        file.filename
                    )));
                    report.failed.push(FileFailure {
                        filename: file.filename,
                        error: e.to_string(),
                    });
                }
            }
        }

        drop(upload_dir);

        if documents.is_empty() {
            session.register_sources(&report.added);
            return Ok(report);
        }

        report.chunks = documents.len();
        self.upsert(session, documents).await?;
        session.register_sources(&report.added);

        let names: Vec<String> = report.added.iter().map(|n| format!("'{n}'")).collect();
        notifier.notify(Toast::success(format!("Documento {} cargado", names.join(", "))));

        Ok(report)
    }

    async fn upsert(&self, session: &Session, documents: Vec<Document>) -> anyhow::Result<()> {
        match session.vector_store() {
            Some(store) => {
                store.add_documents(documents).await?;
            }
            None => {
                let collection = VectorStore::collection_name(session.id());
                tracing::info!(session_id = %session.id(), collection = %collection, "Creating vector store");
                let store =
                    VectorStore::from_documents(collection, documents, Arc::clone(&self.embedder))
                        .await?;
                session.set_vector_store(Arc::new(store));
            }
        }
        Ok(())
    }

    async fn process_file(&self, folder: &Path, file: &UploadedFile) -> anyhow::Result<Vec<Document>> {
        let name = Path::new(&file.filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .context("nombre de archivo inválido")?;

        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        anyhow::ensure!(
            ALLOWED_EXTENSIONS.contains(&extension.as_str()),
            "tipo de archivo no soportado (.{extension})"
        );

        let path = folder.join(name);
        tokio::fs::write(&path, &file.bytes).await?;

        let mut elements = self.partitioner.partition(&path).await?;
        for element in &mut elements {
            element.text = clean::clean_text(&element.text);
        }

        let chunks = self.chunker.chunk_elements(&elements);
        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(chunk_id, chunk)| to_document(&file.filename, chunk_id, chunk))
            .collect())
    }
}

/// Upload folder of one batch, removed when dropped, including when the
/// batch future is cancelled.
#[derive(Debug)]
struct UploadDir {
    path: PathBuf,
}

impl UploadDir {
    async fn create(path: PathBuf) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UploadDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                tracing::warn!(folder = %self.path.display(), error = %e, "Failed to remove upload folder");
            }
            _ => {}
        }
    }
}

/// Wrap a chunk with normalized metadata.
fn to_document(source: &str, chunk_id: usize, chunk: Chunk) -> Document {
    let metadata = chunk.metadata;
    Document::new(
        chunk.text,
        DocumentMetadata {
            source: source.to_string(),
            chunk_id,
            page_number: metadata.page_number,
            filetype: metadata.filetype.unwrap_or_else(|| NONE_SENTINEL.to_string()),
            filename: metadata.filename.unwrap_or_else(|| NONE_SENTINEL.to_string()),
            languages: (!metadata.languages.is_empty()).then(|| metadata.languages.join(", ")),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::partition::{Element, ElementMetadata, LocalPartitioner, PartitionError};
    use crate::rag::HashingEmbedder;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Never finishes partitioning.
    #[derive(Debug)]
    struct StalledPartitioner;

    #[async_trait]
    impl Partitioner for StalledPartitioner {
        async fn partition(&self, _path: &Path) -> Result<Vec<Element>, PartitionError> {
            futures::future::pending().await
        }

        fn supports_mime_type(&self, _mime_type: &str) -> bool {
            true
        }

        fn provider_name(&self) -> &'static str {
            "stalled"
        }
    }

    /// One element per page, as PDF partitioning produces.
    #[derive(Debug)]
    struct PagedPartitioner;

    #[async_trait]
    impl Partitioner for PagedPartitioner {
        async fn partition(&self, _path: &Path) -> Result<Vec<Element>, PartitionError> {
            let page = |n: u32, text: &str| {
                Element::new(
                    text,
                    ElementMetadata {
                        page_number: Some(n),
                        filetype: Some("application/pdf".to_string()),
                        filename: Some("informe.pdf".to_string()),
                        languages: vec!["spa".to_string()],
                    },
                )
            };
            Ok(vec![page(1, &"a".repeat(400)), page(2, &"b".repeat(400))])
        }

        fn supports_mime_type(&self, _mime_type: &str) -> bool {
            true
        }

        fn provider_name(&self) -> &'static str {
            "paged"
        }
    }
    use crate::session::SessionStore;
    use crate::stream::{ToastLevel, ToastLog};

    fn ingestor(root: &Path) -> Ingestor {
        Ingestor::new(
            Arc::new(LocalPartitioner::new()),
            Arc::new(HashingEmbedder::default()),
            IngestOptions {
                upload_root: root.to_path_buf(),
                ..IngestOptions::default()
            },
        )
    }

    #[tokio::test]
    async fn test_ingest_creates_store_and_registers() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path());
        let session = SessionStore::new().create();
        let log = ToastLog::new();

        let report = ingestor
            .load_documents(
                &session,
                vec![UploadedFile::new("notas.md", "# Título\n\nContenido del  documento.")],
                &log,
            )
            .await
            .unwrap();

        assert_eq!(report.added, vec!["notas.md"]);
        assert_eq!(report.chunks, 1);
        assert_eq!(session.sources(), vec!["notas.md"]);
        assert!(session.use_rag());

        let store = session.vector_store().unwrap();
        assert!(store.collection().ends_with(&format!("_{}", session.id())));
        let docs = store.similarity_search("contenido", 5).await.unwrap();
        assert_eq!(docs[0].page_content, "# Título\n\nContenido del documento.");
        assert_eq!(docs[0].metadata.source, "notas.md");
        assert_eq!(docs[0].metadata.page_number, None);

        assert_eq!(log.take(), vec![Toast::success("Documento 'notas.md' cargado")]);
        assert!(!ingestor.session_folder(session.id()).exists());
    }

    #[tokio::test]
    async fn test_duplicate_is_skipped_without_writes_or_toast() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path());
        let session = SessionStore::new().create();
        let log = ToastLog::new();

        ingestor
            .load_documents(&session, vec![UploadedFile::new("a.txt", "uno")], &log)
            .await
            .unwrap();
        let _ = log.take();
        let store = session.vector_store().unwrap();
        let before = store.len().await;

        let report = ingestor
            .load_documents(&session, vec![UploadedFile::new("a.txt", "otro")], &log)
            .await
            .unwrap();

        assert_eq!(report.skipped, vec!["a.txt"]);
        assert!(report.added.is_empty());
        assert_eq!(store.len().await, before);
        assert!(log.take().is_empty());
        assert_eq!(session.document_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_within_batch() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path());
        let session = SessionStore::new().create();

        let report = ingestor
            .load_documents(
                &session,
                vec![UploadedFile::new("a.txt", "uno"), UploadedFile::new("a.txt", "dos")],
                &ToastLog::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.added, vec!["a.txt"]);
        assert_eq!(report.skipped, vec!["a.txt"]);
        assert_eq!(session.document_count(), 1);
    }

    #[tokio::test]
    async fn test_cap_rejects_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path());
        let session = SessionStore::new().create();
        let names: Vec<String> = (0..10).map(|i| format!("doc{i}.txt")).collect();
        session.register_sources(&names);

        let err = ingestor
            .load_documents(&session, vec![UploadedFile::new("nuevo.txt", "x")], &ToastLog::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::TooManyDocuments { max: 10 }));
        assert!(!ingestor.session_folder(session.id()).exists());
        assert!(session.vector_store().is_none());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionStore::new().create();
        let err = ingestor(dir.path())
            .load_documents(&session, Vec::new(), &ToastLog::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoDocuments));
    }

    #[tokio::test]
    async fn test_failures_are_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path());
        let session = SessionStore::new().create();
        let log = ToastLog::new();

        let report = ingestor
            .load_documents(
                &session,
                vec![
                    UploadedFile::new("virus.exe", "MZ"),
                    UploadedFile::new("escaneo.docx", "no es un zip"),
                    UploadedFile::new("bueno.txt", "texto válido"),
                ],
                &log,
            )
            .await
            .unwrap();

        assert_eq!(report.added, vec!["bueno.txt"]);
        assert_eq!(report.failed.len(), 2);

        let toasts = log.take();
        assert_eq!(toasts.len(), 3);
        assert!(toasts[0].message.starts_with("Error al procesar el documento virus.exe: "));
        assert_eq!(toasts[0].level, ToastLevel::Error);
        assert_eq!(toasts[2], Toast::success("Documento 'bueno.txt' cargado"));
        assert_eq!(session.sources(), vec!["bueno.txt"]);
    }

    #[tokio::test]
    async fn test_path_components_are_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path());
        let session = SessionStore::new().create();

        let report = ingestor
            .load_documents(
                &session,
                vec![UploadedFile::new("../../fuera.txt", "contenido")],
                &ToastLog::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.added, vec!["../../fuera.txt"]);
        assert!(!dir.path().parent().unwrap().join("fuera.txt").exists());
    }

    #[test]
    fn test_to_document_metadata() {
        let chunk = Chunk {
            text: "hola".to_string(),
            metadata: partition::ElementMetadata {
                page_number: Some(2),
                filetype: Some("application/pdf".to_string()),
                filename: None,
                languages: vec!["spa".to_string(), "eng".to_string()],
            },
        };
        let doc = to_document("a.pdf", 3, chunk);
        assert_eq!(doc.metadata.chunk_id, 3);
        assert_eq!(doc.metadata.filename, "None");
        assert_eq!(doc.metadata.languages.as_deref(), Some("spa, eng"));
        assert_eq!(doc.citation_label().as_deref(), Some("a.pdf (pag.2)"));
    }

    #[tokio::test]
    async fn test_cancelled_batch_removes_upload_folder() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = Ingestor::new(
            Arc::new(StalledPartitioner),
            Arc::new(HashingEmbedder::default()),
            IngestOptions {
                upload_root: dir.path().to_path_buf(),
                ..IngestOptions::default()
            },
        );
        let session = SessionStore::new().create();
        let folder = ingestor.session_folder(session.id());

        let toasts = ToastLog::new();
        let batch = ingestor.load_documents(
            &session,
            vec![UploadedFile::new("a.txt", "contenido")],
            &toasts,
        );
        let outcome = tokio::time::timeout(Duration::from_millis(200), batch).await;

        assert!(outcome.is_err());
        assert!(!folder.join("a.txt").exists());
        assert!(!folder.exists());
        assert!(session.sources().is_empty());
    }

    #[tokio::test]
    async fn test_page_numbers_reach_citations() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = Ingestor::new(
            Arc::new(PagedPartitioner),
            Arc::new(HashingEmbedder::default()),
            IngestOptions {
                upload_root: dir.path().to_path_buf(),
                ..IngestOptions::default()
            },
        );
        let session = SessionStore::new().create();

        let report = ingestor
            .load_documents(&session, vec![UploadedFile::new("informe.pdf", "%PDF")], &ToastLog::new())
            .await
            .unwrap();
        assert_eq!(report.chunks, 2);

        let store = session.vector_store().unwrap();
        let docs = store.similarity_search("b", 2).await.unwrap();
        let mut labels: Vec<String> = docs.iter().filter_map(Document::citation_label).collect();
        labels.sort();
        assert_eq!(labels, vec!["informe.pdf (pag.1)", "informe.pdf (pag.2)"]);
        assert_eq!(docs[0].metadata.languages.as_deref(), Some("spa"));
    }
}
