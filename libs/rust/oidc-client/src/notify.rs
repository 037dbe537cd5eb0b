//! Session event broadcast.

use tokio::sync::broadcast;
use tracing::debug;

/// Events announced to the embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    /// Both tokens were discarded; the user must log in again.
    LoggedOut,
}

impl SessionEvent {
    /// Event name as seen by listeners.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::LoggedOut => "logged-out",
        }
    }
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Announces session events.
pub trait SessionNotifier: Send + Sync {
    /// Broadcast `event` to every listener.
    fn broadcast(&self, event: SessionEvent);
}

/// Notifier backed by a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(16)
    }
}

impl BroadcastNotifier {
    /// Create a notifier buffering up to `capacity` events per listener.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl SessionNotifier for BroadcastNotifier {
    fn broadcast(&self, event: SessionEvent) {
        match self.sender.send(event) {
            Ok(listeners) => debug!(event = %event, listeners, "Session event broadcast"),
            Err(_) => debug!(event = %event, "Session event broadcast with no listeners"),
        }
    }
}
