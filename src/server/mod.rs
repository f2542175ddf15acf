//! HTTP surface: router, middleware and startup.

pub mod handlers;
pub mod sse;
pub mod upload;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    http::StatusCode,
    middleware::Next,
    response::IntoResponse,
    routing::{get, get_service, post, put},
};
use std::sync::Arc;
use std::time::Duration;

use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::backend::ChatCompletionsBackend;
use crate::config::AppConfig;
use crate::ingest::{IngestOptions, Ingestor, partition::partitioner_from_config};
use crate::llm::LlmSettings;
use crate::rag::{Embedder, FastEmbedder, HashingEmbedder};
use crate::session::SessionStore;
use crate::tools::ToolRegistry;

/// Build the application router over `state`.
pub fn build_router(state: AppState) -> Router {
    let timeout_duration = Duration::from_secs(state.config.server.request_timeout_secs);
    let max_upload_bytes = state.config.server.max_upload_bytes;

    Router::new()
        .route("/", get_service(ServeFile::new("static/index.html")))
        .route("/health", get(handlers::health))
        .route("/api/sessions", post(handlers::create_session))
        .route(
            "/api/sessions/{id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/api/sessions/{id}/api-key", put(handlers::set_api_key))
        .route("/api/sessions/{id}/rag", put(handlers::set_rag))
        .route(
            "/api/sessions/{id}/documents",
            post(upload::upload_documents),
        )
        .route("/api/sessions/{id}/chat", post(handlers::chat))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        // Bounds the time to a response head; SSE bodies keep streaming.
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                match tokio::time::timeout(timeout_duration, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
                }
            },
        ))
        .with_state(state)
}

/// Wire the embedder, partitioner, ingestor and model backend.
pub async fn build_state(config: Arc<AppConfig>, settings: LlmSettings) -> AppState {
    let embedder: Arc<dyn Embedder> = match config.rag.embedder.as_str() {
        "hashing" => Arc::new(HashingEmbedder::default()),
        _ => {
            let embedder = FastEmbedder::new();
            if let Err(e) = embedder.initialize().await {
                tracing::error!("Failed to initialize embedding model: {:?}", e);
            }
            Arc::new(embedder)
        }
    };

    let partitioner = partitioner_from_config(&config.partition);
    info!(
        name: "ingest.partitioner.selected",
        provider = partitioner.provider_name(),
        "Document partitioner selected"
    );

    let ingestor = Arc::new(Ingestor::new(
        partitioner,
        embedder,
        IngestOptions {
            max_documents: config.rag.max_documents,
            chunk_max_characters: config.rag.chunk_max_characters,
            upload_root: config.rag.upload_root.clone(),
        },
    ));

    let tools = ToolRegistry::docuchat_defaults();
    for name in tools.names() {
        info!(name: "tool.registered", tool = %name, "Tool registered");
    }

    let default_api_key = settings.api_key.clone();
    let backend = Arc::new(ChatCompletionsBackend::new(
        settings,
        tools,
        config.rag.retriever_k,
    ));

    AppState {
        config,
        sessions: SessionStore::new(),
        backend,
        ingestor,
        default_api_key,
    }
}

/// Periodically drop sessions idle for longer than the configured timeout.
fn spawn_session_sweeper(sessions: SessionStore, config: &AppConfig) {
    let timeout = config.session.timeout();
    let every = Duration::from_secs(config.session.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let removed = sessions.cleanup_expired_with_timeout(timeout);
            if removed > 0 {
                info!(name: "session.swept", removed, "Expired sessions removed");
            }
        }
    });
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>, settings: LlmSettings) -> anyhow::Result<()> {
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        server_key = settings.api_key.is_some(),
        "LLM configuration loaded"
    );

    let state = build_state(Arc::clone(&config), settings).await;
    spawn_session_sweeper(state.sessions.clone(), &config);

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
