// ABOUTME: Library root for the YouTube live chat client
// ABOUTME: Exposes config loading, the OAuth provider, and the YouTube transport

pub mod config;
pub mod oauth;
pub mod youtube;

pub use livechat_core as core;

use config::Config;
use livechat_core::LiveChat;
use oauth::OAuthProvider;
use std::sync::Arc;
use youtube::YouTubeTransport;

/// OAuth provider seeded with the configured credentials
pub fn oauth_provider(config: &Config) -> Arc<OAuthProvider> {
    Arc::new(OAuthProvider::new(
        &config.oauth.token_url,
        &config.oauth.client_id,
        &config.oauth.client_secret,
        config.credentials(),
    ))
}

/// Engine wired to the YouTube API with the given provider
pub fn build_live_chat(config: &Config, auth: Arc<OAuthProvider>) -> LiveChat {
    let transport = YouTubeTransport::new(&config.youtube.api_base_url);
    LiveChat::new(config.engine_config(), auth, Arc::new(transport))
}
