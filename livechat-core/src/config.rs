// ABOUTME: Engine configuration with serde defaults.
// ABOUTME: Covers polling cadence, page size, dedup bound, and classifier reason lists.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reasons on which the engine can recover by refreshing credentials
pub const DEFAULT_AUTH_REASONS: &[&str] = &["authError"];

/// Rejection reasons documented by the YouTube Data API for liveChatMessages
pub const DEFAULT_KNOWN_REJECTIONS: &[&str] = &[
    "forbidden",
    "liveChatDisabled",
    "liveChatEnded",
    "liveChatNotFound",
    "rateLimitExceeded",
    "quotaExceeded",
];

/// Events beyond the chats of one page that a single cycle can emit
/// (polling, refreshing, error)
const CYCLE_EVENT_HEADROOM: usize = 8;

/// Configuration for one engine instance (one chat feed)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Feed to poll
    pub live_chat_id: String,
    /// Lower bound on the wait between cycles; the server value wins when larger
    #[serde(default = "default_minimum_interval_ms")]
    pub minimum_interval_ms: u64,
    /// Wait after a cycle that produced no response
    #[serde(default = "default_fallback_interval_ms")]
    pub fallback_interval_ms: u64,
    /// Page size requested from the server
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Resource parts requested on each list call
    #[serde(default = "default_parts")]
    pub parts: Vec<String>,
    /// Bound on remembered message IDs (unbounded when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_capacity: Option<usize>,
    /// Broadcast buffer for the event channel. Raised to fit one full page
    /// of chat events, see [`EngineConfig::channel_capacity`].
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

/// Reason lists used by the error classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Reasons that trigger a credential refresh
    #[serde(default = "default_auth_reasons")]
    pub auth_reasons: Vec<String>,
    /// Reasons recognised as API rejections; anything else is reported as unknown
    #[serde(default = "default_known_rejections")]
    pub known_rejections: Vec<String>,
}

fn default_minimum_interval_ms() -> u64 {
    1
}

fn default_fallback_interval_ms() -> u64 {
    10_000
}

fn default_max_results() -> u32 {
    2000
}

fn default_parts() -> Vec<String> {
    vec!["snippet".to_string(), "authorDetails".to_string()]
}

fn default_event_capacity() -> usize {
    256
}

fn default_auth_reasons() -> Vec<String> {
    DEFAULT_AUTH_REASONS.iter().map(|s| s.to_string()).collect()
}

fn default_known_rejections() -> Vec<String> {
    DEFAULT_KNOWN_REJECTIONS.iter().map(|s| s.to_string()).collect()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            auth_reasons: default_auth_reasons(),
            known_rejections: default_known_rejections(),
        }
    }
}

impl EngineConfig {
    /// Defaults for everything except the feed ID
    pub fn new(live_chat_id: impl Into<String>) -> Self {
        Self {
            live_chat_id: live_chat_id.into(),
            minimum_interval_ms: default_minimum_interval_ms(),
            fallback_interval_ms: default_fallback_interval_ms(),
            max_results: default_max_results(),
            parts: default_parts(),
            dedup_capacity: None,
            event_capacity: default_event_capacity(),
            classifier: ClassifierConfig::default(),
        }
    }

    /// Set the caller's minimum interval
    pub fn with_minimum_interval(mut self, interval: Duration) -> Self {
        self.minimum_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn minimum_interval(&self) -> Duration {
        Duration::from_millis(self.minimum_interval_ms.max(1))
    }

    pub fn fallback_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_interval_ms)
    }

    /// Buffer actually allocated for the event channel.
    ///
    /// A cycle emits all chats of a page before any subscriber can run, so
    /// the buffer never shrinks below one full page plus headroom.
    pub fn channel_capacity(&self) -> usize {
        self.event_capacity
            .max(self.max_results as usize + CYCLE_EVENT_HEADROOM)
    }
}
