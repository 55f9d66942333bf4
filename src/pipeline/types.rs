//! Shared types for the ingestion pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extract::ExtractedAttributes;
use crate::source::RawMessage;

// ── Records ─────────────────────────────────────────────────────────

/// A rental ready to be written: message fields plus extracted attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRental {
    /// `None` is allowed and never collides with another record.
    pub source_message_id: Option<i64>,
    pub sender_id: Option<i64>,
    pub sender_username: Option<String>,
    pub message_date: DateTime<Utc>,
    pub raw_text: String,
    pub has_media: bool,
    #[serde(flatten)]
    pub attributes: ExtractedAttributes,
}

impl NewRental {
    pub fn from_message(message: RawMessage, attributes: ExtractedAttributes) -> Self {
        Self {
            source_message_id: Some(message.id),
            sender_id: message.sender_id,
            sender_username: message.sender_username,
            message_date: message.date,
            raw_text: message.text,
            has_media: message.has_media,
            attributes,
        }
    }
}

/// A persisted rental. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub rental: NewRental,
    pub created_at: DateTime<Utc>,
}

impl RentalRecord {
    /// Assign a fresh id and creation time.
    pub fn new(rental: NewRental) -> Self {
        Self {
            id: Uuid::new_v4(),
            rental,
            created_at: Utc::now(),
        }
    }

    pub fn source_message_id(&self) -> Option<i64> {
        self.rental.source_message_id
    }
}

// ── Cycle ───────────────────────────────────────────────────────────

/// Stage of a scrape cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    Idle,
    Fetching,
    Parsing,
    Saving,
    Done,
    Aborted,
}

impl CycleStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::Saving => "saving",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Summary of one scrape cycle.
///
/// Always produced, even when the cycle aborts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleResult {
    pub fetched: usize,
    pub parsed: usize,
    pub saved: usize,
    /// Skipped because a record for the same message already exists.
    pub duplicates: usize,
    pub errors: Vec<String>,
    pub stage: CycleStage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CycleResult {
    pub(crate) fn started(now: DateTime<Utc>) -> Self {
        Self {
            fetched: 0,
            parsed: 0,
            saved: 0,
            duplicates: 0,
            errors: Vec::new(),
            stage: CycleStage::Idle,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.stage == CycleStage::Aborted
    }
}
