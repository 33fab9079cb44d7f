// ABOUTME: Chat message types surfaced by the engine.
// ABOUTME: Platform-neutral shape of one unit of live-chat activity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of activity a feed item represents.
///
/// Only [`MessageKind::Text`] is ever surfaced as a chat event. The other
/// variants exist so adapters can report what the server sent without losing
/// information.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Authored text chat
    Text,
    /// Paid highlighted message
    SuperChat,
    /// Paid sticker
    SuperSticker,
    /// A viewer became a member/sponsor
    NewSponsor,
    /// A moderator deleted a message
    MessageDeleted,
    /// An author retracted their message
    MessageRetracted,
    /// A moderator banned a user
    UserBanned,
    /// The chat was closed by the owner
    ChatEnded,
    /// Placeholder for removed content
    Tombstone,
    /// Anything this crate does not know about
    Other(String),
}

impl MessageKind {
    /// Whether this is authored text chat
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text)
    }
}

/// Roles the author holds in the chat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRoles {
    pub moderator: bool,
    pub owner: bool,
    pub sponsor: bool,
    pub verified: bool,
}

/// Who posted a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAuthor {
    /// Channel identifier of the author
    pub channel_id: String,
    /// Display name at the time the message was fetched
    pub display_name: String,
    /// Avatar URL, when the server sent one
    pub profile_image_url: Option<String>,
    pub roles: AuthorRoles,
}

impl ChatAuthor {
    pub fn new(channel_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            display_name: display_name.into(),
            profile_image_url: None,
            roles: AuthorRoles::default(),
        }
    }
}

/// One unit of chat activity.
///
/// Immutable once built; the engine hands clones to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned identifier, stable across pages
    pub id: String,
    /// Feed this message belongs to
    pub live_chat_id: String,
    pub published_at: DateTime<Utc>,
    pub author: ChatAuthor,
    pub kind: MessageKind,
    /// Message text; only present for [`MessageKind::Text`]
    pub text: Option<String>,
}

impl ChatMessage {
    /// Build a text message
    pub fn text(
        id: impl Into<String>,
        live_chat_id: impl Into<String>,
        author: ChatAuthor,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            live_chat_id: live_chat_id.into(),
            published_at: Utc::now(),
            author,
            kind: MessageKind::Text,
            text: Some(text.into()),
        }
    }

    /// Build a non-text system event
    pub fn system(
        id: impl Into<String>,
        live_chat_id: impl Into<String>,
        author: ChatAuthor,
        kind: MessageKind,
    ) -> Self {
        Self {
            id: id.into(),
            live_chat_id: live_chat_id.into(),
            published_at: Utc::now(),
            author,
            kind,
            text: None,
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind.is_text()
    }
}
