//! Session, settings and chat handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::error::AppError;
use crate::session::SessionSnapshot;
use crate::stream::{ChannelNotifier, chat_stream, rag_stream};

use super::sse::{build_sse_response, chat_events};

/// First assistant message of every session.
pub const GREETING: &str = "Hola, soy DocuChat ¿Que consulta tienes el dia de hoy? Recuerda que puedes subir documentos en la barra lateral.";

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "sessions": state.sessions.len() }))
}

/// POST /api/sessions
pub async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.sessions.create();
    session.add_assistant_message(GREETING);
    tracing::info!(session_id = %session.id(), "Session created");
    (StatusCode::CREATED, Json(session.snapshot()))
}

/// GET /api/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.session(&id)?.snapshot()))
}

/// DELETE /api/sessions/{id}
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .sessions
        .remove(&id)
        .ok_or(AppError::SessionNotFound(id))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ApiKeyRequest {
    #[serde(default)]
    pub api_key: Option<String>,
}

/// PUT /api/sessions/{id}/api-key
pub async fn set_api_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ApiKeyRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(&id)?;
    session.set_api_key(req.api_key);
    Ok(Json(session.snapshot()))
}

#[derive(Debug, Deserialize)]
pub struct RagToggleRequest {
    pub enabled: bool,
}

/// PUT /api/sessions/{id}/rag
pub async fn set_rag(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RagToggleRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(&id)?;
    if !session.set_use_rag(req.enabled) {
        return Err(AppError::RagUnavailable);
    }
    Ok(Json(session.snapshot()))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// POST /api/sessions/{id}/chat
///
/// Appends the user message and streams the answer as SSE. Turns in RAG
/// mode go through the session's retrieval chain; all others go through the
/// tool-calling agent.
pub async fn chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.session(&id)?;
    let api_key = state.api_key_for(&session)?;

    let message = req.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("El mensaje está vacío".to_string()));
    }

    let turn = session.try_begin_turn().ok_or(AppError::SessionBusy)?;
    session.add_user_message(message);

    let (notifier, toasts) = ChannelNotifier::new();

    let rag_store = session.vector_store().filter(|_| session.use_rag());
    let events = match rag_store {
        Some(store) => {
            tracing::info!(session_id = %session.id(), mode = "rag", "Chat turn started");
            let chain = state.backend.rag_chain(&api_key, store);
            let fragments = rag_stream(chain, session, state.config.rag.history_window);
            futures::future::Either::Left(chat_events(fragments, toasts, turn))
        }
        None => {
            tracing::info!(session_id = %session.id(), mode = "agent", "Chat turn started");
            let agent = state.backend.chat_agent(&api_key);
            let fragments = chat_stream(agent, session, Arc::new(notifier));
            futures::future::Either::Right(chat_events(fragments, toasts, turn))
        }
    };

    Ok(build_sse_response(events))
}
