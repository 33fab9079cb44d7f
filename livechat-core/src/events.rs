// ABOUTME: Public event surface: lifecycle, data, error, and credential notifications.
// ABOUTME: Fan-out over a broadcast channel; late subscribers never see earlier events.

use crate::error::LiveChatError;
use crate::message::ChatMessage;
use crate::traits::Credentials;
use tokio::sync::broadcast;

/// Notifications emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Poll loop started
    Connected,
    /// Poll loop stopped
    Disconnected,
    /// A reconnect finished (follows the inner `Connected`)
    Reconnected,
    /// A poll cycle is starting
    Polling,
    /// A new text message arrived
    Chat(ChatMessage),
    /// A failure the engine did not recover from
    Error(LiveChatError),
    /// Expired credentials detected, refresh started
    Refreshing,
    /// The auth provider rotated credentials
    Tokens(Credentials),
}

impl ChatEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnected => "reconnected",
            Self::Polling => "polling",
            Self::Chat(_) => "chat",
            Self::Error(_) => "error",
            Self::Refreshing => "refreshing",
            Self::Tokens(_) => "tokens",
        }
    }
}

/// Broadcast hub for [`ChatEvent`]s.
///
/// Emitting with no subscribers drops the event. That is the default
/// handling for every event, errors included.
#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<ChatEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit(&self, event: ChatEvent) {
        tracing::trace!(event = event.name(), "emit");
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub(crate) fn chat(&self, message: ChatMessage) {
        self.emit(ChatEvent::Chat(message));
    }

    pub(crate) fn error(&self, error: impl Into<LiveChatError>) {
        self.emit(ChatEvent::Error(error.into()));
    }

    pub(crate) fn tokens(&self, credentials: Credentials) {
        self.emit(ChatEvent::Tokens(credentials));
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}
