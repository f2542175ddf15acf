//! Session management.
//!
//! Every chat and ingestion operation receives an explicit [`Session`]: the
//! per-user context holding chat history, ingested document names, the vector
//! store and the RAG toggle. Sessions are created on first contact and torn
//! down on expiry or explicit deletion.
//!
//! # Example
//!
//! ```rust
//! use docuchat::session::SessionStore;
//!
//! let store = SessionStore::new();
//! let session = store.create();
//! session.add_user_message("Hola");
//!
//! assert_eq!(session.messages().len(), 1);
//! ```

mod thread;

pub use thread::{DEFAULT_SESSION_TIMEOUT, Session, SessionSnapshot, SessionStore};
