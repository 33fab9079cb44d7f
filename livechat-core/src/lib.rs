// ABOUTME: Polling and reconciliation engine for paginated live-chat feeds.
// ABOUTME: Dedup, error classification, adaptive cadence, and connection lifecycle.

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod message;
pub mod poll;
pub mod traits;

pub mod testing;

pub use classifier::{Classification, ErrorClassifier, ErrorKind, RecoveryAction};
pub use config::{ClassifierConfig, EngineConfig};
pub use engine::{ConnectionState, LiveChat};
pub use error::{ApiError, AuthError, ErrorCause, LiveChatError};
pub use events::{ChatEvent, EventHub};
pub use ledger::DedupLedger;
pub use message::{AuthorRoles, ChatAuthor, ChatMessage, MessageKind};
pub use poll::{next_interval, PollCursor};
pub use traits::{AuthProvider, Credentials, ListPage, ListRequest, Transport};
