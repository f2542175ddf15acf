//! Conversation state and session storage.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::llm::{Message, MessageRole};
use crate::rag::VectorStore;

/// Default session timeout (30 minutes).
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Per-session context threaded through every chat and ingestion operation.
///
/// Holds the ordered chat history, the names of ingested documents, the
/// session's vector store (once the first document lands) and the RAG toggle.
/// Cloning is cheap and yields a handle to the same session.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    messages: RwLock<Vec<Message>>,
    /// Filenames already ingested, in upload order.
    sources: RwLock<Vec<String>>,
    vector_store: RwLock<Option<Arc<VectorStore>>>,
    use_rag: RwLock<bool>,
    api_key: RwLock<Option<String>>,
    created_at: DateTime<Utc>,
    last_activity: RwLock<DateTime<Utc>>,
    /// Held for the duration of one chat turn or ingestion batch.
    turn: Arc<Mutex<()>>,
}

/// Serializable view of a session for the API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub messages: Vec<Message>,
    pub documents: Vec<String>,
    pub use_rag: bool,
    pub rag_available: bool,
    pub has_api_key: bool,
    pub created_at: String,
    pub last_activity: String,
}

impl Session {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            inner: Arc::new(SessionInner {
                id,
                messages: RwLock::new(Vec::new()),
                sources: RwLock::new(Vec::new()),
                vector_store: RwLock::new(None),
                use_rag: RwLock::new(false),
                api_key: RwLock::new(None),
                created_at: now,
                last_activity: RwLock::new(now),
                turn: Arc::new(Mutex::new(())),
            }),
        }
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Add a user message to the conversation.
    pub fn add_user_message(&self, content: impl Into<String>) {
        self.add_message(Message::new(MessageRole::User, content));
    }

    /// Add an assistant message to the conversation.
    pub fn add_assistant_message(&self, content: impl Into<String>) {
        self.add_message(Message::new(MessageRole::Assistant, content));
    }

    /// Append a message to the conversation.
    pub fn add_message(&self, message: Message) {
        write(&self.inner.messages).push(message);
        self.touch();
    }

    /// Get all messages in the conversation.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        read(&self.inner.messages).clone()
    }

    #[must_use]
    pub fn message_count(&self) -> usize {
        read(&self.inner.messages).len()
    }

    /// Names of the documents ingested so far.
    #[must_use]
    pub fn sources(&self) -> Vec<String> {
        read(&self.inner.sources).clone()
    }

    #[must_use]
    pub fn document_count(&self) -> usize {
        read(&self.inner.sources).len()
    }

    /// Whether a document with exactly this filename was already ingested.
    #[must_use]
    pub fn has_source(&self, filename: &str) -> bool {
        read(&self.inner.sources).iter().any(|s| s == filename)
    }

    /// Record filenames as ingested.
    pub fn register_sources(&self, filenames: &[String]) {
        write(&self.inner.sources).extend(filenames.iter().cloned());
        self.touch();
    }

    /// The session's vector store, if any document was ingested.
    #[must_use]
    pub fn vector_store(&self) -> Option<Arc<VectorStore>> {
        read(&self.inner.vector_store).clone()
    }

    /// Install the session's vector store. The first store switches RAG on.
    pub fn set_vector_store(&self, store: Arc<VectorStore>) {
        let first = write(&self.inner.vector_store).replace(store).is_none();
        if first {
            *write(&self.inner.use_rag) = true;
        }
        self.touch();
    }

    /// Whether questions are answered from the uploaded documents.
    #[must_use]
    pub fn use_rag(&self) -> bool {
        *read(&self.inner.use_rag) && self.vector_store().is_some()
    }

    /// Toggle RAG mode. Enabling fails (returns `false`) while no vector
    /// store exists.
    pub fn set_use_rag(&self, enabled: bool) -> bool {
        if enabled && self.vector_store().is_none() {
            return false;
        }
        *write(&self.inner.use_rag) = enabled;
        self.touch();
        true
    }

    /// The API key supplied for this session.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        read(&self.inner.api_key).clone()
    }

    pub fn set_api_key(&self, key: Option<String>) {
        *write(&self.inner.api_key) = key.filter(|k| !k.trim().is_empty());
        self.touch();
    }

    /// Claim the session for one logical request.
    ///
    /// Returns `None` while another chat turn or ingestion batch is running.
    #[must_use]
    pub fn try_begin_turn(&self) -> Option<OwnedMutexGuard<()>> {
        Arc::clone(&self.inner.turn).try_lock_owned().ok()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.inner.id.clone(),
            messages: self.messages(),
            documents: self.sources(),
            use_rag: self.use_rag(),
            rag_available: self.vector_store().is_some(),
            has_api_key: self.api_key().is_some(),
            created_at: self.inner.created_at.to_rfc3339(),
            last_activity: read(&self.inner.last_activity).to_rfc3339(),
        }
    }

    fn touch(&self) {
        *write(&self.inner.last_activity) = Utc::now();
    }

    /// Check if the session has been idle longer than `timeout`.
    #[must_use]
    pub fn is_expired_with_timeout(&self, timeout: Duration) -> bool {
        let last = *read(&self.inner.last_activity);
        // Negative duration means clock skew; treat as active.
        (Utc::now() - last)
            .to_std()
            .is_ok_and(|idle| idle > timeout)
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe store for sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new session and return it.
    #[must_use]
    pub fn create(&self) -> Session {
        self.create_with_id(Uuid::new_v4().to_string())
    }

    /// Create a new session with a specific ID.
    #[must_use]
    pub fn create_with_id(&self, id: impl Into<String>) -> Session {
        let id = id.into();
        let session = Session::new(id.clone());
        write(&self.inner).insert(id, session.clone());
        session
    }

    /// Get a session by ID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        read(&self.inner).get(id).cloned()
    }

    /// Remove a session by ID.
    pub fn remove(&self, id: &str) -> Option<Session> {
        write(&self.inner).remove(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove sessions that have been inactive longer than the timeout.
    ///
    /// Returns the number of sessions removed.
    pub fn cleanup_expired_with_timeout(&self, timeout: Duration) -> usize {
        let mut guard = write(&self.inner);
        let before = guard.len();
        guard.retain(|_, session| !session.is_expired_with_timeout(timeout));
        before - guard.len()
    }
}
