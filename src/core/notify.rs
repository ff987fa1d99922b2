//! Transient user-facing notifications

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

/// Sending half of the notification channel
///
/// Emitting never fails: once the receiver is gone notifications are only logged.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: UnboundedSender<Notification>,
}

impl Notifier {
    pub fn channel() -> (Self, UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn info(&self, title: impl Into<String>, description: impl Into<String>) {
        self.emit(Notification {
            title: title.into(),
            description: description.into(),
            severity: Severity::Info,
        });
    }

    pub fn error(&self, title: impl Into<String>, description: impl Into<String>) {
        self.emit(Notification {
            title: title.into(),
            description: description.into(),
            severity: Severity::Error,
        });
    }

    fn emit(&self, notification: Notification) {
        match notification.severity {
            Severity::Info => {
                tracing::info!("{}: {}", notification.title, notification.description)
            }
            Severity::Error => {
                tracing::warn!("{}: {}", notification.title, notification.description)
            }
        }
        if self.tx.send(notification).is_err() {
            tracing::trace!("Notification receiver dropped");
        }
    }
}
