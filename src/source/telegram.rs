//! Telegram source — reads channel posts through the Bot API.
//!
//! The bot must be a member (admin) of the channel. Posts arrive as
//! `channel_post` updates in chronological order, so `list_messages()`
//! drains the pending window and re-orders it newest-first before yielding.
//! Drained updates are acknowledged through the update offset; posts
//! re-delivered after a crash are caught by deduplication downstream.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::SourceError;
use crate::source::types::{MessageSource, MessageStream, SourceMessage};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Updates requested per `getUpdates` call (Bot API maximum).
const UPDATES_PAGE_SIZE: u32 = 100;

/// Upper bound on pages drained per listing.
const MAX_UPDATE_PAGES: usize = 50;

static RETRY_AFTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)retry after (\d+)").expect("valid regex"));

/// Session state shared across calls.
#[derive(Debug, Default)]
struct Session {
    /// Resolved numeric chat id; `Some` while connected.
    chat_id: Option<i64>,
    /// Next update offset to request.
    offset: i64,
}

/// Telegram channel source backed by the Bot API.
pub struct TelegramSource {
    bot_token: SecretString,
    channel: String,
    api_base: String,
    client: reqwest::Client,
    session: Mutex<Session>,
}

impl TelegramSource {
    pub fn new(
        bot_token: SecretString,
        channel: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SourceError::Connection {
                reason: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            bot_token,
            channel: channel.into(),
            api_base: TELEGRAM_API_BASE.to_string(),
            client,
            session: Mutex::new(Session::default()),
        })
    }

    /// Point the source at a different Bot API server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.expose_secret()
        )
    }

    /// Call a Bot API method and unwrap its `{ok, result}` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, SourceError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| SourceError::Connection {
                reason: format!("{method}: {}", e.without_url()),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| SourceError::Connection {
            reason: format!("{method}: {}", e.without_url()),
        })?;

        let envelope: ApiEnvelope<T> = match serde_json::from_str(&text) {
            Ok(env) => env,
            Err(e) if status.is_success() => {
                return Err(SourceError::InvalidPayload(format!("{method}: {e}")));
            }
            Err(_) => {
                return Err(classify_api_error(&self.channel, status.as_u16(), &text, None));
            }
        };

        match envelope {
            ApiEnvelope {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiEnvelope {
                error_code,
                description,
                parameters,
                ..
            } => Err(classify_api_error(
                &self.channel,
                error_code.unwrap_or_else(|| status.as_u16()),
                description.as_deref().unwrap_or("unknown error"),
                parameters.and_then(|p| p.retry_after),
            )),
        }
    }

    /// Drain pending `channel_post` updates for `chat_id`.
    async fn drain_posts(
        &self,
        session: &mut Session,
        chat_id: i64,
    ) -> Result<Vec<SourceMessage>, SourceError> {
        let mut posts = Vec::new();

        for _ in 0..MAX_UPDATE_PAGES {
            let updates: Vec<Update> = self
                .call(
                    "getUpdates",
                    serde_json::json!({
                        "offset": session.offset,
                        "limit": UPDATES_PAGE_SIZE,
                        "timeout": 0,
                        "allowed_updates": ["channel_post"],
                    }),
                )
                .await?;

            if updates.is_empty() {
                break;
            }

            for update in updates {
                session.offset = session.offset.max(update.update_id + 1);
                let Some(post) = update.channel_post else {
                    continue;
                };
                if post.chat.id != chat_id {
                    continue;
                }
                posts.push(post_to_message(post)?);
            }
        }

        Ok(posts)
    }
}

#[async_trait]
impl MessageSource for TelegramSource {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn connect(&self) -> Result<(), SourceError> {
        let mut session = self.session.lock().await;
        if session.chat_id.is_some() {
            return Ok(());
        }

        let me: User = self.call("getMe", serde_json::json!({})).await?;
        let chat: Chat = self
            .call("getChat", serde_json::json!({ "chat_id": self.channel }))
            .await?;

        info!(
            bot = me.username.as_deref().unwrap_or("unknown"),
            channel = %self.channel,
            chat_id = chat.id,
            "Connected to Telegram"
        );
        session.chat_id = Some(chat.id);
        Ok(())
    }

    async fn list_messages(&self) -> Result<MessageStream, SourceError> {
        if self.session.lock().await.chat_id.is_none() {
            self.connect().await?;
        }

        let mut session = self.session.lock().await;
        let chat_id = session.chat_id.ok_or_else(|| SourceError::Connection {
            reason: "session closed while listing".into(),
        })?;

        let mut posts = self.drain_posts(&mut session, chat_id).await?;
        posts.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        debug!(count = posts.len(), offset = session.offset, "Drained channel posts");

        Ok(Box::pin(futures::stream::iter(
            posts.into_iter().map(Ok::<_, SourceError>),
        )))
    }

    async fn disconnect(&self) -> Result<(), SourceError> {
        let mut session = self.session.lock().await;
        if session.chat_id.take().is_some() {
            debug!(channel = %self.channel, "Disconnected from Telegram");
        }
        Ok(())
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    channel_post: Option<ChannelPost>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelPost {
    message_id: i64,
    date: i64,
    chat: Chat,
    text: Option<String>,
    caption: Option<String>,
    from: Option<User>,
    sender_chat: Option<Chat>,
    author_signature: Option<String>,
    photo: Option<serde_json::Value>,
    video: Option<serde_json::Value>,
    document: Option<serde_json::Value>,
    animation: Option<serde_json::Value>,
    audio: Option<serde_json::Value>,
    voice: Option<serde_json::Value>,
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Convert a channel post into a source message.
fn post_to_message(post: ChannelPost) -> Result<SourceMessage, SourceError> {
    let date = DateTime::from_timestamp(post.date, 0).ok_or_else(|| {
        SourceError::InvalidPayload(format!(
            "message {} has invalid date {}",
            post.message_id, post.date
        ))
    })?;

    let has_media = post.photo.is_some()
        || post.video.is_some()
        || post.document.is_some()
        || post.animation.is_some()
        || post.audio.is_some()
        || post.voice.is_some();

    let (sender_id, sender_username) = match (post.from, post.sender_chat) {
        (Some(user), _) => (Some(user.id), user.username),
        (None, Some(chat)) => (Some(chat.id), chat.username),
        (None, None) => (None, None),
    };

    Ok(SourceMessage {
        id: post.message_id,
        text: post.text.or(post.caption),
        date,
        sender_id,
        sender_username: sender_username.or(post.author_signature),
        has_media,
    })
}

/// Map a Bot API failure onto the source error taxonomy.
fn classify_api_error(
    channel: &str,
    code: u16,
    description: &str,
    retry_after: Option<u64>,
) -> SourceError {
    match code {
        429 => SourceError::RateLimited {
            retry_after: retry_after
                .or_else(|| parse_retry_hint(description))
                .map(Duration::from_secs),
        },
        401 | 404 => SourceError::Connection {
            reason: format!("authentication failed: {description}"),
        },
        403 => SourceError::ChannelPrivate {
            channel: channel.to_string(),
        },
        400 if description.to_lowercase().contains("chat not found") => {
            SourceError::ChannelNotFound {
                channel: channel.to_string(),
            }
        }
        _ => SourceError::Api {
            code,
            description: description.to_string(),
        },
    }
}

/// Parse "retry after N" out of an error description.
fn parse_retry_hint(description: &str) -> Option<u64> {
    RETRY_AFTER_RE
        .captures(description)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
