//! Out-of-band notifications ("toasts") shown next to the chat.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Info,
    Success,
    Error,
}

/// A short message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub message: String,
    pub level: ToastLevel,
}

impl Toast {
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: ToastLevel::Info,
        }
    }

    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: ToastLevel::Success,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: ToastLevel::Error,
        }
    }
}

/// Sink for toasts. Delivery is best effort.
pub trait Notifier: Send + Sync {
    fn notify(&self, toast: Toast);
}

/// Forwards toasts into a channel drained by the SSE response.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Toast>,
}

impl ChannelNotifier {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Toast>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, toast: Toast) {
        if self.tx.send(toast).is_err() {
            tracing::debug!("Toast dropped: receiver closed");
        }
    }
}

/// Collects toasts in memory, for request/response endpoints.
#[derive(Debug, Default)]
pub struct ToastLog {
    toasts: Mutex<Vec<Toast>>,
}

impl ToastLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every toast collected so far.
    #[must_use]
    pub fn take(&self) -> Vec<Toast> {
        std::mem::take(&mut *self.toasts.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Notifier for ToastLog {
    fn notify(&self, toast: Toast) {
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(toast);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toast_log_take() {
        let log = ToastLog::new();
        log.notify(Toast::info("uno"));
        log.notify(Toast::error("dos"));
        let toasts = log.take();
        assert_eq!(toasts.len(), 2);
        assert_eq!(toasts[1].level, ToastLevel::Error);
        assert!(log.take().is_empty());
    }

    #[tokio::test]
    async fn test_channel_notifier() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(Toast::success("listo"));
        assert_eq!(rx.recv().await, Some(Toast::success("listo")));

        drop(rx);
        // Sending after the receiver is gone must not panic.
        notifier.notify(Toast::info("tarde"));
    }

    #[test]
    fn test_level_serializes_lowercase() {
        let json = serde_json::to_value(Toast::success("ok")).unwrap();
        assert_eq!(json, serde_json::json!({ "message": "ok", "level": "success" }));
    }
}
