//! Adapters from agent and chain output to user-facing text fragments.
//!
//! - [`relay`]: general chat; hides tool calls and tool results
//! - [`rag`]: document answers followed by their citations
//! - [`classifier`]: content block classification shared by the relay
//! - [`notify`]: toasts raised while streaming or ingesting

pub mod classifier;
pub mod notify;
pub mod rag;
pub mod relay;

pub use classifier::{StreamEvent, classify, classify_block};
pub use notify::{ChannelNotifier, Notifier, Toast, ToastLevel, ToastLog};
pub use rag::{DEFAULT_HISTORY_WINDOW, format_sources, rag_stream};
pub use relay::chat_stream;
