//! Shared types for source reading.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

// ── Messages ────────────────────────────────────────────────────────

/// A message as listed by the source, before filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMessage {
    /// Source-native message id (unique per channel).
    pub id: i64,
    /// Text body, or the media caption. `None` for text-less posts.
    pub text: Option<String>,
    pub date: DateTime<Utc>,
    pub sender_id: Option<i64>,
    pub sender_username: Option<String>,
    pub has_media: bool,
}

/// A relevant message, canonicalized for the extraction stage.
///
/// Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: i64,
    pub sender_id: Option<i64>,
    pub sender_username: Option<String>,
    pub text: String,
    pub date: DateTime<Utc>,
    pub has_media: bool,
}

impl RawMessage {
    /// Canonicalize a source message. Returns `None` when there is no text.
    pub fn from_source(message: SourceMessage) -> Option<Self> {
        let text = message.text.filter(|t| !t.trim().is_empty())?;
        Some(Self {
            id: message.id,
            sender_id: message.sender_id,
            sender_username: message.sender_username,
            text,
            date: message.date,
            has_media: message.has_media,
        })
    }
}

// ── Source trait ────────────────────────────────────────────────────

/// Lazy, newest-first sequence of source messages.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<SourceMessage, SourceError>> + Send>>;

/// Trait for messaging sources — pure I/O, no filtering.
///
/// Contract: `list_messages()` yields messages in strictly descending time
/// order. `SourceReader` stops at the first message older than its watermark,
/// so a source without that guarantee must be wrapped to fetch a full window
/// and sort it before yielding.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Source name for logging (e.g. "telegram").
    fn name(&self) -> &str;

    /// Open a session. Calling it while connected is a no-op.
    async fn connect(&self) -> Result<(), SourceError>;

    /// List channel messages, newest first.
    async fn list_messages(&self) -> Result<MessageStream, SourceError>;

    /// Close the session. Calling it while disconnected is a no-op.
    async fn disconnect(&self) -> Result<(), SourceError>;
}
