// ABOUTME: Maps API failures onto an error taxonomy and a recovery action.
// ABOUTME: Only expired credentials are recovered automatically; everything else is surfaced.

use crate::config::ClassifierConfig;
use crate::error::ApiError;
use std::collections::HashSet;

/// What the engine should do about a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Emit the error and move on
    Surface,
    /// Refresh credentials in the background and keep polling
    RefreshAndRetry,
}

/// Category of a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No structured cause: network or decoding failure
    Transport,
    /// Credentials expired or were rejected
    AuthExpired,
    /// The API refused the request for a named reason
    ApiRejection {
        reason: String,
        /// Whether the reason is in the configured list
        known: bool,
    },
}

/// Result of classifying one failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub action: RecoveryAction,
}

/// Error classifier driven by configurable reason lists
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    auth_reasons: HashSet<String>,
    known_rejections: HashSet<String>,
}

impl ErrorClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            auth_reasons: config.auth_reasons.iter().cloned().collect(),
            known_rejections: config.known_rejections.iter().cloned().collect(),
        }
    }

    /// Classify by the first cause of the error
    pub fn classify(&self, error: &ApiError) -> Classification {
        let Some(reason) = error.reason() else {
            return Classification {
                kind: ErrorKind::Transport,
                action: RecoveryAction::Surface,
            };
        };

        if self.auth_reasons.contains(reason) {
            return Classification {
                kind: ErrorKind::AuthExpired,
                action: RecoveryAction::RefreshAndRetry,
            };
        }

        Classification {
            kind: ErrorKind::ApiRejection {
                reason: reason.to_string(),
                known: self.known_rejections.contains(reason),
            },
            action: RecoveryAction::Surface,
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}
