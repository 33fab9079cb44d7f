// ABOUTME: YouTube Data API v3 transport for liveChatMessages list/insert/delete.
// ABOUTME: Maps the wire JSON onto ChatMessage and the Google error envelope onto ApiError.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use livechat_core::{
    ApiError, AuthorRoles, ChatAuthor, ChatMessage, Credentials, ErrorCause, ListPage,
    ListRequest, MessageKind, Transport,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    polling_interval_millis: Option<u64>,
    #[serde(default)]
    items: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    id: String,
    snippet: WireSnippet,
    #[serde(default)]
    author_details: Option<WireAuthor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSnippet {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    live_chat_id: Option<String>,
    #[serde(default)]
    author_channel_id: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    display_message: Option<String>,
    #[serde(default)]
    text_message_details: Option<WireTextDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTextDetails {
    message_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAuthor {
    channel_id: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    profile_image_url: Option<String>,
    #[serde(default)]
    is_chat_moderator: bool,
    #[serde(default)]
    is_chat_owner: bool,
    #[serde(default)]
    is_chat_sponsor: bool,
    #[serde(default)]
    is_verified: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: WireError,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<WireErrorCause>,
}

#[derive(Debug, Deserialize)]
struct WireErrorCause {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

/// Request body for posting a text message
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertBody<'a> {
    snippet: InsertSnippet<'a>,
}

impl<'a> InsertBody<'a> {
    pub fn text(live_chat_id: &'a str, text: &'a str) -> Self {
        Self {
            snippet: InsertSnippet {
                live_chat_id,
                kind: "textMessageEvent",
                text_message_details: InsertText { message_text: text },
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertSnippet<'a> {
    live_chat_id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text_message_details: InsertText<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertText<'a> {
    message_text: &'a str,
}

// =============================================================================
// Mapping
// =============================================================================

/// Map a snippet `type` string onto a [`MessageKind`]
pub fn message_kind(wire: &str) -> MessageKind {
    match wire {
        "textMessageEvent" => MessageKind::Text,
        "superChatEvent" => MessageKind::SuperChat,
        "superStickerEvent" => MessageKind::SuperSticker,
        "newSponsorEvent" => MessageKind::NewSponsor,
        "messageDeletedEvent" => MessageKind::MessageDeleted,
        "messageRetractedEvent" => MessageKind::MessageRetracted,
        "userBannedEvent" => MessageKind::UserBanned,
        "chatEndedEvent" => MessageKind::ChatEnded,
        "tombstone" => MessageKind::Tombstone,
        other => MessageKind::Other(other.to_string()),
    }
}

fn into_message(wire: WireMessage, fallback_chat_id: &str) -> ChatMessage {
    let WireMessage {
        id,
        snippet,
        author_details,
    } = wire;

    let kind = message_kind(&snippet.kind);
    let text = if kind.is_text() {
        snippet
            .text_message_details
            .map(|d| d.message_text)
            .or(snippet.display_message)
    } else {
        None
    };

    let author = match author_details {
        Some(a) => ChatAuthor {
            channel_id: a.channel_id,
            display_name: a.display_name,
            profile_image_url: a.profile_image_url,
            roles: AuthorRoles {
                moderator: a.is_chat_moderator,
                owner: a.is_chat_owner,
                sponsor: a.is_chat_sponsor,
                verified: a.is_verified,
            },
        },
        None => ChatAuthor::new(snippet.author_channel_id.unwrap_or_default(), ""),
    };

    ChatMessage {
        id,
        live_chat_id: snippet
            .live_chat_id
            .unwrap_or_else(|| fallback_chat_id.to_string()),
        published_at: snippet.published_at.unwrap_or_else(Utc::now),
        author,
        kind,
        text,
    }
}

/// Decode a successful `liveChatMessages.list` body
pub fn parse_list_response(body: &str, live_chat_id: &str) -> Result<ListPage, ApiError> {
    let response: ListResponse = serde_json::from_str(body)
        .map_err(|e| ApiError::transport(format!("invalid list response: {}", e)))?;

    Ok(ListPage {
        items: response
            .items
            .into_iter()
            .map(|m| into_message(m, live_chat_id))
            .collect(),
        next_page_token: response.next_page_token,
        polling_interval: Duration::from_millis(response.polling_interval_millis.unwrap_or(0)),
    })
}

/// Decode a successful `liveChatMessages.insert` body
pub fn parse_insert_response(body: &str, live_chat_id: &str) -> Result<ChatMessage, ApiError> {
    let wire: WireMessage = serde_json::from_str(body)
        .map_err(|e| ApiError::transport(format!("invalid insert response: {}", e)))?;
    Ok(into_message(wire, live_chat_id))
}

/// Decode a failed response.
///
/// Bodies that are not a Google error envelope still yield the status, with
/// no causes, so they classify as transport failures.
pub fn parse_error_response(status: u16, body: &str) -> ApiError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let causes: Vec<ErrorCause> = envelope
                .error
                .errors
                .into_iter()
                .map(|c| ErrorCause::new(c.reason, c.message))
                .collect();
            let message = if envelope.error.message.is_empty() {
                format!("HTTP {}", status)
            } else {
                envelope.error.message
            };
            ApiError {
                status: Some(status),
                message,
                causes,
            }
        }
        Err(_) => ApiError {
            status: Some(status),
            message: format!("HTTP {}", status),
            causes: Vec::new(),
        },
    }
}

// =============================================================================
// Transport
// =============================================================================

/// reqwest-backed [`Transport`] for the YouTube Data API
#[derive(Clone)]
pub struct YouTubeTransport {
    base_url: String,
    client: reqwest::Client,
}

impl YouTubeTransport {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/liveChat/messages", self.base_url)
    }

    /// Read the body, turning non-2xx answers into an [`ApiError`]
    async fn read_body(response: reqwest::Response) -> Result<String, ApiError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::transport(format!("failed to read response: {}", e)))?;
        if !status.is_success() {
            return Err(parse_error_response(status.as_u16(), &body));
        }
        Ok(body)
    }
}

fn send_error(e: reqwest::Error) -> ApiError {
    ApiError::transport(format!("request failed: {}", e))
}

#[async_trait]
impl Transport for YouTubeTransport {
    async fn list(
        &self,
        credentials: &Credentials,
        request: &ListRequest,
    ) -> Result<ListPage, ApiError> {
        let mut query = vec![
            ("liveChatId", request.live_chat_id.clone()),
            ("part", request.parts.join(",")),
            ("maxResults", request.max_results.to_string()),
        ];
        if let Some(token) = &request.page_token {
            query.push(("pageToken", token.clone()));
        }

        let response = self
            .client
            .get(self.messages_url())
            .bearer_auth(&credentials.access_token)
            .query(&query)
            .send()
            .await
            .map_err(send_error)?;
        let body = Self::read_body(response).await?;
        parse_list_response(&body, &request.live_chat_id)
    }

    async fn insert(
        &self,
        credentials: &Credentials,
        live_chat_id: &str,
        text: &str,
    ) -> Result<ChatMessage, ApiError> {
        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&credentials.access_token)
            .query(&[("part", "snippet")])
            .json(&InsertBody::text(live_chat_id, text))
            .send()
            .await
            .map_err(send_error)?;
        let body = Self::read_body(response).await?;
        parse_insert_response(&body, live_chat_id)
    }

    async fn delete(&self, credentials: &Credentials, message_id: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.messages_url())
            .bearer_auth(&credentials.access_token)
            .query(&[("id", message_id)])
            .send()
            .await
            .map_err(send_error)?;
        Self::read_body(response).await?;
        Ok(())
    }
}
