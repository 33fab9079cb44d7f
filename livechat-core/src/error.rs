// ABOUTME: Error types shared by the engine and its collaborators.
// ABOUTME: ApiError is the structured failure every Transport returns.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One cause attached to an API failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCause {
    /// Machine-readable reason (e.g., "authError", "liveChatNotFound")
    pub reason: String,
    /// Human-readable description
    pub message: String,
}

impl ErrorCause {
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Structured failure returned by a Transport.
///
/// An empty `causes` list means the request never produced an API answer
/// (network or decoding failure).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    /// HTTP status, when a response was received
    pub status: Option<u16>,
    pub message: String,
    /// Ordered causes as reported by the server
    pub causes: Vec<ErrorCause>,
}

impl ApiError {
    /// Failure with no structured cause
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Failure carrying a single cause
    pub fn with_reason(status: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: Some(status),
            causes: vec![ErrorCause::new(reason, message.clone())],
            message,
        }
    }

    /// Reason of the first cause, which decides recovery
    pub fn reason(&self) -> Option<&str> {
        self.causes.first().map(|c| c.reason.as_str())
    }

    pub fn is_transport(&self) -> bool {
        self.causes.is_empty()
    }
}

/// Credential refresh failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AuthError {
    /// Token endpoint error code, when one was returned (e.g., "invalid_grant")
    pub reason: Option<String>,
    pub message: String,
}

impl AuthError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            reason: None,
            message: message.into(),
        }
    }

    pub fn with_reason(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            message: message.into(),
        }
    }
}

/// Errors surfaced by the engine, either on the event channel or to callers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiveChatError {
    #[error("API request failed: {0}")]
    Api(#[from] ApiError),

    #[error("Credential refresh failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Already connected")]
    AlreadyConnected,
}

impl LiveChatError {
    /// The API error reason, if this wraps a structured API failure
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Api(e) => e.reason(),
            _ => None,
        }
    }
}
