// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and builds the engine config and initial credentials
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use livechat_core::{ClassifierConfig, Credentials, EngineConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub youtube: YouTubeConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeConfig {
    pub live_chat_id: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token expiry in epoch milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_fallback_interval_ms")]
    pub fallback_interval_ms: u64,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_capacity: Option<usize>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            access_token: None,
            refresh_token: None,
            expiry_date: None,
            token_url: default_token_url(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            fallback_interval_ms: default_fallback_interval_ms(),
            max_results: default_max_results(),
            dedup_capacity: None,
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_interval_ms() -> u64 {
    1
}

fn default_fallback_interval_ms() -> u64 {
    10_000
}

fn default_max_results() -> u32 {
    2000
}

impl Config {
    /// Load configuration from LIVECHAT_CONFIG_PATH (or ./config.toml) with
    /// environment variable overrides
    pub fn load() -> Result<Self> {
        let path = std::env::var("LIVECHAT_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));
        Self::load_from(&path)
    }

    /// Load configuration from an explicit path. A missing file is not an
    /// error as long as the environment supplies the required fields.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Config {
                youtube: YouTubeConfig {
                    live_chat_id: String::new(),
                    api_base_url: default_api_base_url(),
                },
                oauth: OAuthConfig::default(),
                polling: PollingConfig::default(),
                classifier: ClassifierConfig::default(),
            }
        };

        // Override with environment variables if present
        if let Ok(val) = std::env::var("LIVE_CHAT_ID") {
            config.youtube.live_chat_id = val;
        }
        if let Ok(val) = std::env::var("YOUTUBE_API_URL") {
            config.youtube.api_base_url = val;
        }
        if let Ok(val) = std::env::var("CLIENT_ID") {
            config.oauth.client_id = val;
        }
        if let Ok(val) = std::env::var("CLIENT_SECRET") {
            config.oauth.client_secret = val;
        }
        if let Ok(val) = std::env::var("ACCESS_TOKEN") {
            config.oauth.access_token = Some(val);
        }
        if let Ok(val) = std::env::var("REFRESH_TOKEN") {
            config.oauth.refresh_token = Some(val);
        }
        if let Ok(val) = std::env::var("OAUTH_TOKEN_URL") {
            config.oauth.token_url = val;
        }
        if let Ok(val) = std::env::var("POLL_INTERVAL_MS") {
            config.polling.interval_ms = val.parse().with_context(|| {
                format!("POLL_INTERVAL_MS must be a number of milliseconds, got: {}", val)
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.youtube.live_chat_id.trim().is_empty() {
            anyhow::bail!(
                "youtube.live_chat_id is required (set in config.toml or LIVE_CHAT_ID env var)"
            );
        }
        if self.youtube.api_base_url.trim().is_empty() {
            anyhow::bail!("youtube.api_base_url must not be empty");
        }

        let has_access = self
            .oauth
            .access_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        let has_refresh = self
            .oauth
            .refresh_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        if !has_access && !has_refresh {
            anyhow::bail!("Either oauth.access_token or oauth.refresh_token is required");
        }
        if has_refresh
            && (self.oauth.client_id.trim().is_empty() || self.oauth.client_secret.trim().is_empty())
        {
            anyhow::bail!(
                "oauth.client_id and oauth.client_secret are required to refresh tokens \
                 (set in config.toml or CLIENT_ID/CLIENT_SECRET env vars)"
            );
        }

        if self.polling.max_results == 0 {
            anyhow::bail!("polling.max_results must be at least 1");
        }
        if self.polling.dedup_capacity == Some(0) {
            anyhow::bail!("polling.dedup_capacity must be at least 1 when set");
        }
        Ok(())
    }

    /// Engine settings for the configured feed
    pub fn engine_config(&self) -> EngineConfig {
        let mut engine = EngineConfig::new(self.youtube.live_chat_id.clone());
        engine.minimum_interval_ms = self.polling.interval_ms.max(1);
        engine.fallback_interval_ms = self.polling.fallback_interval_ms;
        engine.max_results = self.polling.max_results;
        engine.dedup_capacity = self.polling.dedup_capacity;
        engine.classifier = self.classifier.clone();
        engine
    }

    /// Credentials to start from. The access token may be empty, in which
    /// case the engine refreshes on connect.
    pub fn credentials(&self) -> Credentials {
        let mut credentials = Credentials::new(self.oauth.access_token.clone().unwrap_or_default());
        if let Some(refresh_token) = self.oauth.refresh_token.as_deref() {
            credentials = credentials.with_refresh_token(refresh_token);
        }
        if let Some(expiry) = self.oauth.expiry_date.and_then(expiry_from_millis) {
            credentials = credentials.with_expiry(expiry);
        }
        credentials
    }
}

fn expiry_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
