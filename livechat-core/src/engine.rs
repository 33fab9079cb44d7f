// ABOUTME: Connection state machine wrapping the poll loop, plus say/delete.
// ABOUTME: LiveChat is the cloneable handle callers hold for one chat feed.

use crate::classifier::{Classification, ErrorClassifier, RecoveryAction};
use crate::config::EngineConfig;
use crate::error::{ApiError, LiveChatError};
use crate::events::{ChatEvent, EventHub};
use crate::message::ChatMessage;
use crate::poll::{self, FeedState, PollCursor};
use crate::traits::{AuthProvider, Credentials, Transport};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Whether the poll loop is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// One connect..disconnect span
struct Session {
    cancel: CancellationToken,
    /// Credentials bound at connect, replaced on every rotation
    credentials: Credentials,
}

pub(crate) struct Lifecycle {
    state: ConnectionState,
    session: Option<Session>,
}

impl Lifecycle {
    pub(crate) fn session_credentials(&self) -> Option<Credentials> {
        self.session.as_ref().map(|s| s.credentials.clone())
    }
}

pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) auth: Arc<dyn AuthProvider>,
    pub(crate) classifier: ErrorClassifier,
    pub(crate) events: EventHub,
    lifecycle: Mutex<Lifecycle>,
    feed: Mutex<FeedState>,
}

impl Shared {
    /// Lock order is lifecycle, then feed.
    pub(crate) fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn lock_feed(&self) -> MutexGuard<'_, FeedState> {
        self.feed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bound credentials while connected, the provider's otherwise
    fn current_credentials(&self) -> Credentials {
        self.lock_lifecycle()
            .session_credentials()
            .unwrap_or_else(|| self.auth.credentials())
    }

    /// Classify a failure and act on it. Must not take the lifecycle lock.
    pub(crate) fn handle_failure(&self, error: ApiError) -> Classification {
        let classification = self.classifier.classify(&error);
        match classification.action {
            RecoveryAction::RefreshAndRetry => {
                tracing::warn!(
                    reason = error.reason().unwrap_or_default(),
                    "Credentials rejected, refreshing"
                );
                self.spawn_refresh();
            }
            RecoveryAction::Surface => {
                tracing::warn!(
                    kind = ?classification.kind,
                    status = ?error.status,
                    error = %error,
                    "Chat API request failed"
                );
                self.events.error(error);
            }
        }
        classification
    }

    /// Fire-and-forget credential refresh. The poll loop never waits on it.
    fn spawn_refresh(&self) {
        self.events.emit(ChatEvent::Refreshing);
        let auth = Arc::clone(&self.auth);
        let events = self.events.clone();
        tokio::spawn(async move {
            match auth.refresh().await {
                Ok(_) => tracing::info!("Credentials refreshed"),
                Err(e) => {
                    tracing::error!(error = %e, reason = ?e.reason, "Credential refresh failed");
                    events.error(e);
                }
            }
        });
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(session) = lifecycle.session.take() {
            session.cancel.cancel();
        }
    }
}

/// Client for one live chat feed.
///
/// Cloning is cheap; all clones drive the same engine. `connect`,
/// `disconnect` and `reconnect` return immediately and must be called from
/// within a tokio runtime.
#[derive(Clone)]
pub struct LiveChat {
    shared: Arc<Shared>,
}

impl LiveChat {
    pub fn new(
        config: EngineConfig,
        auth: Arc<dyn AuthProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let shared = Shared {
            classifier: ErrorClassifier::new(&config.classifier),
            events: EventHub::new(config.channel_capacity()),
            feed: Mutex::new(FeedState::new(config.dedup_capacity)),
            lifecycle: Mutex::new(Lifecycle {
                state: ConnectionState::Disconnected,
                session: None,
            }),
            config,
            transport,
            auth,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Subscribe to engine events. Events emitted earlier are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock_lifecycle().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Current pagination position
    pub fn cursor(&self) -> PollCursor {
        self.shared.lock_feed().cursor.clone()
    }

    /// Number of message IDs the dedup ledger remembers
    pub fn known_messages(&self) -> usize {
        self.shared.lock_feed().ledger.len()
    }

    /// Bind credentials and start polling; the first cycle runs immediately.
    ///
    /// Connecting an engine that is already connected is a caller error and
    /// returns [`LiveChatError::AlreadyConnected`].
    pub fn connect(&self) -> Result<(), LiveChatError> {
        let mut lifecycle = self.shared.lock_lifecycle();
        if lifecycle.state == ConnectionState::Connected {
            return Err(LiveChatError::AlreadyConnected);
        }

        let credentials = self.shared.auth.credentials();
        let needs_refresh = credentials.needs_refresh(chrono::Utc::now());
        let rotations = self.shared.auth.subscribe();
        let cancel = CancellationToken::new();

        lifecycle.state = ConnectionState::Connected;
        lifecycle.session = Some(Session {
            cancel: cancel.clone(),
            credentials,
        });

        tokio::spawn(forward_rotations(
            Arc::downgrade(&self.shared),
            rotations,
            cancel.clone(),
        ));
        // `Connected` goes out under the lock, ahead of the first `Polling`.
        tokio::spawn(poll::run(Arc::downgrade(&self.shared), cancel));

        tracing::info!(live_chat_id = %self.shared.config.live_chat_id, "Connected to live chat");
        self.shared.events.emit(ChatEvent::Connected);

        if needs_refresh {
            tracing::info!("Bound credentials are missing or expired, refreshing");
            self.shared.spawn_refresh();
        }
        Ok(())
    }

    /// Stop polling. No chat or polling event and no further cycle is
    /// observable once this returns, even if a fetch was in flight.
    ///
    /// Disconnecting an engine that is not connected does nothing.
    pub fn disconnect(&self) {
        let mut lifecycle = self.shared.lock_lifecycle();
        if lifecycle.state == ConnectionState::Disconnected {
            return;
        }

        if let Some(session) = lifecycle.session.take() {
            session.cancel.cancel();
        }
        lifecycle.state = ConnectionState::Disconnected;

        tracing::info!(live_chat_id = %self.shared.config.live_chat_id, "Disconnected from live chat");
        self.shared.events.emit(ChatEvent::Disconnected);
    }

    /// Disconnect, re-read credentials from the provider, and connect again.
    ///
    /// The cursor and dedup ledger carry over, so backlog is not re-announced.
    ///
    /// On an engine that is not connected the disconnect step does nothing,
    /// so subscribers see `connected` then `reconnected` with no
    /// `disconnected` ahead of them.
    pub fn reconnect(&self) -> Result<(), LiveChatError> {
        self.disconnect();
        self.connect()?;
        self.shared.events.emit(ChatEvent::Reconnected);
        Ok(())
    }

    /// Post a text message. Works whether or not the poll loop is running.
    ///
    /// Failures reject this call and go through the classifier, so they are
    /// also emitted as `error` events unless they triggered a refresh.
    pub async fn say(&self, text: &str) -> Result<ChatMessage, LiveChatError> {
        let credentials = self.shared.current_credentials();
        let result = self
            .shared
            .transport
            .insert(&credentials, &self.shared.config.live_chat_id, text)
            .await;

        match result {
            Ok(message) => {
                tracing::debug!(message_id = %message.id, "Message sent");
                Ok(message)
            }
            Err(error) => {
                self.shared.handle_failure(error.clone());
                Err(error.into())
            }
        }
    }

    /// Delete a message by ID
    pub async fn delete(&self, message_id: &str) -> Result<(), LiveChatError> {
        let credentials = self.shared.current_credentials();
        match self.shared.transport.delete(&credentials, message_id).await {
            Ok(()) => {
                tracing::debug!(message_id, "Message deleted");
                Ok(())
            }
            Err(error) => {
                self.shared.handle_failure(error.clone());
                Err(error.into())
            }
        }
    }
}

/// Forward provider rotations as `tokens` events and rebind the session.
async fn forward_rotations(
    shared: Weak<Shared>,
    mut rotations: broadcast::Receiver<Credentials>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = rotations.recv() => received,
        };

        match received {
            Ok(credentials) => {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let mut lifecycle = shared.lock_lifecycle();
                if cancel.is_cancelled() {
                    break;
                }
                if let Some(session) = lifecycle.session.as_mut() {
                    session.credentials = credentials.clone();
                }
                shared.events.tokens(credentials);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Credential rotation receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
