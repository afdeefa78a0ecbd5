//! In-process notification channel backed by a tokio broadcast channel.
//!
//! Every consumer (UI broadcast, chat bot, the daemon's log writer)
//! subscribes independently.

use tokio::sync::broadcast;

use flowhub_domain::notification::NotificationEvent;

/// Fan-out channel for [`NotificationEvent`]s.
///
/// Emitting succeeds even when there are no active subscribers
/// (the event is simply dropped).
#[derive(Debug, Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<NotificationEvent>,
}

impl NotificationBus {
    /// Create a new bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to notifications emitted *after* this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.sender.subscribe()
    }

    /// Deliver `event` to every current subscriber; returns how many got it.
    pub fn emit(&self, event: NotificationEvent) -> usize {
        tracing::debug!(text = %event.text, "notification emitted");
        // send only fails when nobody is listening
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(256)
    }
}
