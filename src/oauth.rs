// ABOUTME: OAuth2 refresh-token credential provider for Google APIs.
// ABOUTME: Exchanges the refresh token at the token endpoint and broadcasts each rotation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use livechat_core::{AuthError, AuthProvider, Credentials};
use serde::Deserialize;
use std::sync::Mutex;
use tokio::sync::broadcast;

const ROTATION_CHANNEL_CAPACITY: usize = 16;

/// Successful token endpoint answer
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Only sent when the server rotates the refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Merge a token response into the previous credentials.
///
/// The old refresh token is kept when the server omits a new one.
pub fn apply_token_response(
    previous: &Credentials,
    response: TokenResponse,
    now: DateTime<Utc>,
) -> Credentials {
    Credentials {
        access_token: response.access_token,
        refresh_token: response.refresh_token.or_else(|| previous.refresh_token.clone()),
        expiry: response.expires_in.map(|secs| now + Duration::seconds(secs)),
    }
}

/// Turn a failed token endpoint answer into an [`AuthError`]
pub fn parse_token_error(status: u16, body: &str) -> AuthError {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(parsed) => {
            let message = parsed
                .error_description
                .unwrap_or_else(|| format!("token endpoint returned {}", parsed.error));
            AuthError::with_reason(parsed.error, message)
        }
        Err(_) => AuthError::new(format!("token endpoint returned HTTP {}", status)),
    }
}

/// Credential provider backed by a Google OAuth2 refresh token
pub struct OAuthProvider {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    credentials: Mutex<Credentials>,
    rotations: broadcast::Sender<Credentials>,
    /// Serializes refreshes so concurrent callers share one exchange
    refresh_lock: tokio::sync::Mutex<()>,
}

impl OAuthProvider {
    pub fn new(
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        credentials: Credentials,
    ) -> Self {
        Self::with_client(reqwest::Client::new(), token_url, client_id, client_secret, credentials)
    }

    pub fn with_client(
        client: reqwest::Client,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        credentials: Credentials,
    ) -> Self {
        let (rotations, _) = broadcast::channel(ROTATION_CHANNEL_CAPACITY);
        Self {
            client,
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            credentials: Mutex::new(credentials),
            rotations,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn lock_credentials(&self) -> std::sync::MutexGuard<'_, Credentials> {
        self.credentials.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn exchange(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::new(format!("token request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::new(format!("failed to read token response: {}", e)))?;

        if !status.is_success() {
            return Err(parse_token_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| AuthError::new(format!("invalid token response: {}", e)))
    }
}

#[async_trait]
impl AuthProvider for OAuthProvider {
    fn credentials(&self) -> Credentials {
        self.lock_credentials().clone()
    }

    async fn refresh(&self) -> Result<Credentials, AuthError> {
        let _guard = self.refresh_lock.lock().await;

        let previous = self.credentials();
        let refresh_token = previous
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::new("no refresh token available"))?;

        tracing::debug!(token_url = %self.token_url, "Exchanging refresh token");
        let response = self.exchange(&refresh_token).await?;
        let rotated = apply_token_response(&previous, response, Utc::now());

        *self.lock_credentials() = rotated.clone();
        tracing::info!(expiry = ?rotated.expiry, "Access token rotated");
        let _ = self.rotations.send(rotated.clone());
        Ok(rotated)
    }

    fn subscribe(&self) -> broadcast::Receiver<Credentials> {
        self.rotations.subscribe()
    }
}
