//! SSE framing of a chat turn.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde_json::json;
use tokio::sync::{OwnedMutexGuard, mpsc};

use crate::stream::Toast;

/// One event of the chat response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Answer fragment.
    Delta { text: String },
    /// Notification raised during the turn.
    Toast(Toast),
    /// The turn failed; nothing more follows but `Done`.
    Error { message: String },
    Done,
}

impl ChatEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Delta { .. } => "delta",
            Self::Toast(_) => "toast",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }

    #[must_use]
    pub fn data(&self) -> serde_json::Value {
        match self {
            Self::Delta { text } => json!({ "text": text }),
            Self::Toast(toast) => json!({ "message": toast.message, "level": toast.level }),
            Self::Error { message } => json!({ "message": message }),
            Self::Done => json!({}),
        }
    }
}

enum Step {
    Toast(Toast),
    Fragment(Option<anyhow::Result<String>>),
}

/// Merge answer fragments and toasts into chat events.
///
/// Toasts are delivered as soon as they are raised, ahead of pending
/// fragments. A failed fragment ends the turn with an `error` event. The
/// stream always finishes with `done`, and holds `turn` until then.
pub fn chat_events<S>(
    fragments: S,
    mut toasts: mpsc::UnboundedReceiver<Toast>,
    turn: OwnedMutexGuard<()>,
) -> impl Stream<Item = ChatEvent> + Send + 'static
where
    S: Stream<Item = anyhow::Result<String>> + Send + 'static,
{
    async_stream::stream! {
        let _turn = turn;
        futures::pin_mut!(fragments);

        loop {
            let step = tokio::select! {
                biased;
                Some(toast) = toasts.recv() => Step::Toast(toast),
                next = fragments.next() => Step::Fragment(next),
            };

            match step {
                Step::Toast(toast) => yield ChatEvent::Toast(toast),
                Step::Fragment(Some(Ok(text))) => yield ChatEvent::Delta { text },
                Step::Fragment(Some(Err(e))) => {
                    tracing::error!(error = %e, "Chat turn failed");
                    while let Ok(toast) = toasts.try_recv() {
                        yield ChatEvent::Toast(toast);
                    }
                    yield ChatEvent::Error { message: format!("Error: {e}") };
                    break;
                }
                Step::Fragment(None) => break,
            }
        }

        while let Ok(toast) = toasts.try_recv() {
            yield ChatEvent::Toast(toast);
        }
        yield ChatEvent::Done;
    }
}

pub fn build_sse_response<S>(stream: S) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send>
where
    S: Stream<Item = ChatEvent> + Send + 'static,
{
    let stream = stream.map(|event| Ok(Event::default().event(event.name()).data(event.data().to_string())));

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn turn() -> OwnedMutexGuard<()> {
        Arc::new(Mutex::new(())).try_lock_owned().unwrap()
    }

    #[tokio::test]
    async fn test_fragments_then_done() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let fragments = futures::stream::iter(vec![Ok("a".to_string()), Ok("b".to_string())]);
        let events: Vec<ChatEvent> = chat_events(fragments, rx, turn()).collect().await;
        assert_eq!(
            events,
            vec![
                ChatEvent::Delta { text: "a".to_string() },
                ChatEvent::Delta { text: "b".to_string() },
                ChatEvent::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_pending_toast_precedes_fragment() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Toast::info("Usando herramienta: search")).unwrap();
        drop(tx);
        let fragments = futures::stream::iter(vec![Ok("x".to_string())]);
        let events: Vec<ChatEvent> = chat_events(fragments, rx, turn()).collect().await;
        assert_eq!(events[0].name(), "toast");
        assert_eq!(events[1].name(), "delta");
    }

    #[tokio::test]
    async fn test_error_ends_turn() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let fragments = futures::stream::iter(vec![
            Ok("parcial".to_string()),
            Err(anyhow::anyhow!("boom")),
            Ok("nunca".to_string()),
        ]);
        let events: Vec<ChatEvent> = chat_events(fragments, rx, turn()).collect().await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], ChatEvent::Error { message: "Error: boom".to_string() });
        assert_eq!(events[2], ChatEvent::Done);
    }

    #[tokio::test]
    async fn test_turn_released_when_stream_ends() {
        let lock = Arc::new(Mutex::new(()));
        let guard = Arc::clone(&lock).try_lock_owned().unwrap();
        let (_tx, rx) = mpsc::unbounded_channel();
        let events = chat_events(futures::stream::iter(Vec::new()), rx, guard);
        assert!(lock.try_lock().is_err());
        let _: Vec<ChatEvent> = events.collect().await;
        assert!(lock.try_lock().is_ok());
    }

    #[test]
    fn test_event_payloads() {
        assert_eq!(ChatEvent::Done.data(), json!({}));
        assert_eq!(
            ChatEvent::Toast(Toast::success("ok")).data(),
            json!({ "message": "ok", "level": "success" })
        );
    }
}
