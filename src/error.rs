//! Application errors and their HTTP rendering.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Errors surfaced to the user.
///
/// Messages are user-facing and in Spanish; `code` is stable for clients.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Por favor, ingresa tu API Key de Gemini")]
    MissingApiKey,

    #[error("No se subio ningun documento")]
    NoDocuments,

    #[error("Solo se pueden cargar hasta {max} documentos, elimine alguno")]
    TooManyDocuments { max: usize },

    #[error("Carga al menos un documento para usar RAG")]
    RagUnavailable,

    #[error("La sesión está procesando otra solicitud")]
    SessionBusy,

    #[error("Sesión no encontrada: {0}")]
    SessionNotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Error interno: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

impl AppError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingApiKey => "MISSING_API_KEY",
            Self::NoDocuments => "NO_DOCUMENTS",
            Self::TooManyDocuments { .. } => "TOO_MANY_DOCUMENTS",
            Self::RagUnavailable => "RAG_UNAVAILABLE",
            Self::SessionBusy => "SESSION_BUSY",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Internal(_) => "INTERNAL",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingApiKey => StatusCode::UNAUTHORIZED,
            Self::NoDocuments | Self::TooManyDocuments { .. } | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::RagUnavailable | Self::SessionBusy => StatusCode::CONFLICT,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "Request rejected");
        }

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
                code: self.code(),
            }),
        )
            .into_response()
    }
}
