// ABOUTME: Collaborator traits the engine consumes: credentials and HTTP transport.
// ABOUTME: Concrete adapters live outside this crate; mocks live in `testing`.

use crate::error::{ApiError, AuthError};
use crate::message::ChatMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;

// =============================================================================
// Credentials
// =============================================================================

/// Bearer credential pair supplied by an [`AuthProvider`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When the access token stops being valid, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expiry: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// True when there is no usable access token at `now`
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.access_token.is_empty() || self.expiry.is_some_and(|exp| exp <= now)
    }
}

/// Holds and rotates bearer credentials.
///
/// Providers broadcast every rotated credential set to subscribers; the
/// engine forwards those as `tokens` events.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current credentials snapshot
    fn credentials(&self) -> Credentials;

    /// Obtain fresh credentials. On success the provider must also notify
    /// subscribers.
    async fn refresh(&self) -> Result<Credentials, AuthError>;

    /// Subscribe to credential rotations
    fn subscribe(&self) -> broadcast::Receiver<Credentials>;
}

// =============================================================================
// Transport
// =============================================================================

/// Parameters for one page fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub live_chat_id: String,
    /// Absent on the first page
    pub page_token: Option<String>,
    pub max_results: u32,
    /// Resource parts to include (e.g., "snippet", "authorDetails")
    pub parts: Vec<String>,
}

/// One page of the feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Items in server order
    pub items: Vec<ChatMessage>,
    pub next_page_token: Option<String>,
    /// Server-suggested wait before the next fetch
    pub polling_interval: Duration,
}

/// Performs requests against the chat API.
///
/// Implementations own timeouts and retries at the HTTP level; the engine
/// never enforces one on a fetch.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch one page of messages
    async fn list(
        &self,
        credentials: &Credentials,
        request: &ListRequest,
    ) -> Result<ListPage, ApiError>;

    /// Post a text message, returning the server's copy
    async fn insert(
        &self,
        credentials: &Credentials,
        live_chat_id: &str,
        text: &str,
    ) -> Result<ChatMessage, ApiError>;

    /// Delete a message by ID
    async fn delete(&self, credentials: &Credentials, message_id: &str) -> Result<(), ApiError>;
}
