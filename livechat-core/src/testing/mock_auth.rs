// ABOUTME: Mock AuthProvider that counts refreshes and rotates tokens on demand.
// ABOUTME: Each successful refresh issues "<prefix>-N" and broadcasts it like a real provider.

use crate::error::AuthError;
use crate::traits::{AuthProvider, Credentials};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Mock credential provider
#[derive(Clone)]
pub struct MockAuthProvider {
    credentials: Arc<Mutex<Credentials>>,
    failures: Arc<Mutex<VecDeque<AuthError>>>,
    refreshes: Arc<AtomicUsize>,
    rotations: broadcast::Sender<Credentials>,
}

impl MockAuthProvider {
    pub fn new(access_token: &str) -> Self {
        let (rotations, _) = broadcast::channel(16);
        Self {
            credentials: Arc::new(Mutex::new(
                Credentials::new(access_token).with_refresh_token("refresh-token"),
            )),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            refreshes: Arc::new(AtomicUsize::new(0)),
            rotations,
        }
    }

    /// Make the next refresh fail
    pub fn fail_next_refresh(self, error: AuthError) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
        self
    }

    /// Replace the credentials without notifying subscribers, as an
    /// out-of-band credential update would
    pub fn set_credentials(&self, credentials: Credentials) {
        *self.credentials.lock().unwrap_or_else(|e| e.into_inner()) = credentials;
    }

    /// Rotate and notify, as a provider-initiated refresh would
    pub fn rotate(&self, credentials: Credentials) {
        self.set_credentials(credentials.clone());
        let _ = self.rotations.send(credentials);
    }

    /// Number of `refresh` calls so far
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    fn credentials(&self) -> Credentials {
        self.credentials
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn refresh(&self) -> Result<Credentials, AuthError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;

        let failure = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        let refreshed = Credentials {
            access_token: format!("refreshed-{}", n),
            ..self.credentials()
        };
        self.rotate(refreshed.clone());
        Ok(refreshed)
    }

    fn subscribe(&self) -> broadcast::Receiver<Credentials> {
        self.rotations.subscribe()
    }
}
