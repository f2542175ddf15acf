//! Multipart document upload.

use axum::{
    Json,
    extract::{Multipart, Path, State},
};
use serde::Serialize;

use crate::AppState;
use crate::error::AppError;
use crate::ingest::{IngestReport, UploadedFile};
use crate::stream::{Toast, ToastLog};

/// Multipart field carrying the uploaded files.
pub const FILES_FIELD: &str = "files";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub report: IngestReport,
    pub toasts: Vec<Toast>,
    pub documents: Vec<String>,
    pub use_rag: bool,
}

/// POST /api/sessions/{id}/documents
pub async fn upload_documents(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let session = state.session(&id)?;

    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Multipart inválido: {e}")))?
    {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("No se pudo leer {filename}: {e}")))?;
        files.push(UploadedFile::new(filename, bytes.to_vec()));
    }

    let _turn = session.try_begin_turn().ok_or(AppError::SessionBusy)?;

    let toasts = ToastLog::new();
    let report = state
        .ingestor
        .load_documents(&session, files, &toasts)
        .await?;

    tracing::info!(
        session_id = %session.id(),
        added = report.added.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        chunks = report.chunks,
        "Upload batch processed"
    );

    Ok(Json(UploadResponse {
        report,
        toasts: toasts.take(),
        documents: session.sources(),
        use_rag: session.use_rag(),
    }))
}
