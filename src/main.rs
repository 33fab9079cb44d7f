// ABOUTME: Command-line entry point for watching and posting to a YouTube live chat
// ABOUTME: Initializes logging and config, then runs the watch, say, or delete command

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use livechat::{build_live_chat, config::Config, oauth::OAuthProvider, oauth_provider};
use livechat_core::{AuthProvider, ChatEvent, LiveChat, LiveChatError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Rejection reasons after which the feed will never produce messages again
const TERMINAL_REASONS: &[&str] = &["liveChatEnded", "liveChatNotFound", "liveChatDisabled"];

#[derive(Parser)]
#[command(name = "livechat")]
#[command(about = "Watch and post to a YouTube live chat")]
#[command(version)]
struct Cli {
    /// Path to config.toml (defaults to LIVECHAT_CONFIG_PATH or ./config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the chat and log every new message until interrupted
    Watch {
        /// Print chat messages as JSON lines on stdout
        #[arg(long)]
        json: bool,
    },

    /// Post a text message
    Say {
        /// Message text
        text: String,
    },

    /// Delete a message by ID
    Delete {
        /// Message ID
        message_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    tracing::info!(
        live_chat_id = %config.youtube.live_chat_id,
        api_base_url = %config.youtube.api_base_url,
        interval_ms = config.polling.interval_ms,
        "Configuration loaded"
    );

    let auth = oauth_provider(&config);
    let chat = build_live_chat(&config, Arc::clone(&auth));

    match cli.command {
        Commands::Watch { json } => watch(chat, json).await,
        Commands::Say { text } => {
            ensure_fresh(&auth).await?;
            let message = chat.say(&text).await.context("Failed to send message")?;
            tracing::info!(message_id = %message.id, "Message sent");
            println!("{}", message.id);
            Ok(())
        }
        Commands::Delete { message_id } => {
            ensure_fresh(&auth).await?;
            chat.delete(&message_id)
                .await
                .context("Failed to delete message")?;
            tracing::info!(message_id = %message_id, "Message deleted");
            Ok(())
        }
    }
}

/// One-shot commands do not go through connect, so refresh up front
async fn ensure_fresh(auth: &OAuthProvider) -> Result<()> {
    if auth.credentials().needs_refresh(chrono::Utc::now()) {
        auth.refresh()
            .await
            .context("Failed to refresh access token")?;
    }
    Ok(())
}

async fn watch(chat: LiveChat, json: bool) -> Result<()> {
    let mut events = chat.subscribe();
    chat.connect()?;

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, disconnecting");
                chat.disconnect();
                break;
            }
            event = events.recv() => event,
        };

        match event {
            Ok(ChatEvent::Chat(message)) => {
                if json {
                    println!("{}", serde_json::to_string(&message)?);
                } else {
                    println!(
                        "[{}] {}: {}",
                        message.published_at.format("%H:%M:%S"),
                        message.author.display_name,
                        message.text.as_deref().unwrap_or_default()
                    );
                }
            }
            Ok(ChatEvent::Error(error)) => {
                tracing::error!(error = %error, reason = ?error.reason(), "Live chat error");
                if is_terminal(&error) {
                    chat.disconnect();
                    break;
                }
            }
            Ok(ChatEvent::Tokens(credentials)) => {
                tracing::info!(expiry = ?credentials.expiry, "Received rotated access token");
            }
            Ok(other) => tracing::debug!(event = other.name(), "Live chat event"),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Event receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    Ok(())
}

fn is_terminal(error: &LiveChatError) -> bool {
    error
        .reason()
        .is_some_and(|reason| TERMINAL_REASONS.contains(&reason))
}
