//! Scrape pipeline — one fetch → extract → dedup → save cycle.
//!
//! A cycle moves through `Idle → Fetching → Parsing → Saving → Done`.
//! A fetch failure ends it in `Aborted`. Failures after fetching are
//! scoped to one message and collected into the `CycleResult`; the cycle
//! itself never returns an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info, warn};

use crate::extract::{AttributeExtractor, Extraction};
use crate::pipeline::dedup::Deduplicator;
use crate::pipeline::sink::{PersistenceSink, SaveOutcome};
use crate::pipeline::types::{CycleResult, CycleStage, NewRental};
use crate::source::SourceReader;
use crate::store::RentalStore;

/// Fetch window and cap for each cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleLimits {
    /// How far back from "now" a cycle looks.
    pub lookback: Duration,
    /// Maximum relevant messages handled per cycle.
    pub max_messages: usize,
}

/// Runs scrape cycles end to end.
pub struct ScrapePipeline {
    reader: SourceReader,
    extractor: AttributeExtractor,
    dedup: Deduplicator,
    sink: PersistenceSink,
    limits: CycleLimits,
}

impl ScrapePipeline {
    pub fn new(
        reader: SourceReader,
        extractor: AttributeExtractor,
        store: Arc<dyn RentalStore>,
        limits: CycleLimits,
    ) -> Self {
        Self {
            reader,
            extractor,
            dedup: Deduplicator::new(Arc::clone(&store)),
            sink: PersistenceSink::new(store),
            limits,
        }
    }

    /// Run one cycle with the current time as reference.
    pub async fn run_cycle(&self) -> CycleResult {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle with `now` as the reference time for the watermark.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleResult {
        let mut result = CycleResult::started(now);
        let watermark = watermark(now, self.limits.lookback);
        info!(
            since = %watermark,
            max_messages = self.limits.max_messages,
            "Starting scrape cycle"
        );

        // ── Fetching ────────────────────────────────────────────────
        advance(&mut result, CycleStage::Fetching);
        let messages = match self
            .reader
            .fetch_since(watermark, self.limits.max_messages)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                error!(error = %e, "Fetch failed, aborting cycle");
                result.errors.push(format!("fetch failed: {e}"));
                return finish(result, CycleStage::Aborted);
            }
        };
        result.fetched = messages.len();

        if messages.is_empty() {
            info!(since = %watermark, "No new messages");
            return finish(result, CycleStage::Done);
        }

        // ── Parsing ─────────────────────────────────────────────────
        advance(&mut result, CycleStage::Parsing);
        let mut extracted = Vec::with_capacity(messages.len());
        for extraction in self.extractor.extract_batch(&messages).await {
            match extraction {
                Extraction::Parsed {
                    message,
                    attributes,
                } => extracted.push(NewRental::from_message(message, attributes)),
                Extraction::Degraded { message, error } => {
                    result
                        .errors
                        .push(format!("message {}: extraction failed: {error}", message.id));
                }
            }
        }
        result.parsed = extracted.len();

        // ── Saving ──────────────────────────────────────────────────
        advance(&mut result, CycleStage::Saving);
        for rental in extracted {
            self.save_one(rental, &mut result).await;
        }

        finish(result, CycleStage::Done)
    }

    async fn save_one(&self, rental: NewRental, result: &mut CycleResult) {
        let source_message_id = rental.source_message_id;

        match self.dedup.is_duplicate(source_message_id).await {
            Ok(true) => {
                debug!(source_message_id = ?source_message_id, "Skipping duplicate");
                result.duplicates += 1;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "Duplicate check failed, skipping record");
                result.errors.push(e.to_string());
                return;
            }
        }

        match self.sink.save(rental).await {
            Ok(SaveOutcome::Saved(_)) => result.saved += 1,
            Ok(SaveOutcome::Duplicate { .. }) => result.duplicates += 1,
            Err(e) => {
                error!(error = %e, "Failed to save rental");
                result.errors.push(e.to_string());
            }
        }
    }
}

/// Oldest message timestamp a cycle at `now` will accept.
fn watermark(now: DateTime<Utc>, lookback: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(lookback)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn advance(result: &mut CycleResult, stage: CycleStage) {
    debug!(from = %result.stage, to = %stage, "Cycle stage");
    result.stage = stage;
}

fn finish(mut result: CycleResult, stage: CycleStage) -> CycleResult {
    advance(&mut result, stage);
    result.finished_at = Utc::now().max(result.started_at);
    info!(
        stage = %result.stage,
        fetched = result.fetched,
        parsed = result.parsed,
        saved = result.saved,
        duplicates = result.duplicates,
        errors = result.errors.len(),
        "Scrape cycle finished"
    );
    result
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream;

    use super::*;
    use crate::error::{ExtractionError, SourceError};
    use crate::extract::ExtractionService;
    use crate::source::{MessageSource, MessageStream, RelevanceFilter, SourceMessage};
    use crate::store::LibSqlBackend;

    struct ListSource {
        messages: Vec<SourceMessage>,
        fail: bool,
    }

    #[async_trait]
    impl MessageSource for ListSource {
        fn name(&self) -> &str {
            "list"
        }

        async fn connect(&self) -> Result<(), SourceError> {
            if self.fail {
                return Err(SourceError::Connection {
                    reason: "network unreachable".into(),
                });
            }
            Ok(())
        }

        async fn list_messages(&self) -> Result<MessageStream, SourceError> {
            let items: Vec<_> = self
                .messages
                .iter()
                .cloned()
                .map(Ok::<_, SourceError>)
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }

        async fn disconnect(&self) -> Result<(), SourceError> {
            Ok(())
        }
    }

    /// Fails for prompts containing "FAIL", otherwise returns a fixed price.
    struct KeywordService {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ExtractionService for KeywordService {
        fn model_name(&self) -> &str {
            "keyword"
        }

        async fn complete_json(&self, prompt: &str) -> Result<String, ExtractionError> {
            *self.calls.lock().unwrap() += 1;
            if prompt.contains("FAIL") {
                return Err(ExtractionError::Provider("500 upstream error".into()));
            }
            Ok(r#"{"price": 500}"#.into())
        }
    }

    fn message(id: i64, minutes_ago: i64, text: &str, now: DateTime<Utc>) -> SourceMessage {
        SourceMessage {
            id,
            text: Some(text.into()),
            date: now - TimeDelta::minutes(minutes_ago),
            sender_id: Some(id * 10),
            sender_username: None,
            has_media: false,
        }
    }

    async fn pipeline(
        messages: Vec<SourceMessage>,
        fail_fetch: bool,
    ) -> (ScrapePipeline, Arc<LibSqlBackend>) {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let source = Arc::new(ListSource {
            messages,
            fail: fail_fetch,
        });
        let service = Arc::new(KeywordService {
            calls: Mutex::new(0),
        });
        let pipeline = ScrapePipeline::new(
            SourceReader::new(source, RelevanceFilter::default()),
            AttributeExtractor::new(service, Duration::ZERO),
            store.clone(),
            CycleLimits {
                lookback: Duration::from_secs(3600),
                max_messages: 100,
            },
        );
        (pipeline, store)
    }

    #[tokio::test]
    async fn cycle_counts_each_stage() {
        let now = Utc::now();
        let (pipeline, store) = pipeline(
            vec![
                message(3, 5, "#offro stanza A", now),
                message(2, 10, "#offro FAIL stanza B", now),
                message(1, 15, "#offro stanza C", now),
            ],
            false,
        )
        .await;

        let result = pipeline.run_cycle_at(now).await;

        assert_eq!(result.stage, CycleStage::Done);
        assert_eq!(result.fetched, 3);
        assert_eq!(result.parsed, 2);
        assert_eq!(result.saved, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("message 2"));
        assert_eq!(store.count_rentals().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn fetch_failure_aborts_with_zero_counts() {
        let now = Utc::now();
        let (pipeline, _store) = pipeline(vec![message(1, 1, "#offro", now)], true).await;

        let result = pipeline.run_cycle_at(now).await;

        assert!(result.is_aborted());
        assert_eq!(result.fetched, 0);
        assert_eq!(result.parsed, 0);
        assert_eq!(result.saved, 0);
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn empty_fetch_short_circuits_to_done() {
        let now = Utc::now();
        let (pipeline, _store) = pipeline(vec![message(1, 120, "#offro old", now)], false).await;

        let result = pipeline.run_cycle_at(now).await;

        assert_eq!(result.stage, CycleStage::Done);
        assert_eq!(result.fetched, 0);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn repeated_cycle_counts_duplicates_not_errors() {
        let now = Utc::now();
        let (pipeline, store) = pipeline(vec![message(7, 1, "#offro bilocale", now)], false).await;

        let first = pipeline.run_cycle_at(now).await;
        let second = pipeline.run_cycle_at(now).await;

        assert_eq!(first.saved, 1);
        assert_eq!(second.saved, 0);
        assert_eq!(second.duplicates, 1);
        assert!(second.errors.is_empty());
        assert_eq!(store.count_rentals().await.unwrap(), 1);
    }

    #[test]
    fn watermark_saturates_on_huge_lookback() {
        let now = Utc::now();
        assert_eq!(
            watermark(now, Duration::from_secs(60)),
            now - TimeDelta::seconds(60)
        );
        assert_eq!(watermark(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
    }
}
