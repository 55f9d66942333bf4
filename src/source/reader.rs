//! Source reader — bounded, filtered fetch of recent messages.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::source::filter::RelevanceFilter;
use crate::source::types::{MessageSource, RawMessage};

/// Reads relevant messages newer than a watermark from a `MessageSource`.
pub struct SourceReader {
    source: Arc<dyn MessageSource>,
    filter: RelevanceFilter,
}

impl SourceReader {
    pub fn new(source: Arc<dyn MessageSource>, filter: RelevanceFilter) -> Self {
        Self { source, filter }
    }

    /// Fetch relevant messages at or after `watermark`, at most `max_count`.
    ///
    /// The session is always disconnected before returning, on success and
    /// on error. Iteration stops at the first message older than the
    /// watermark, which relies on the source listing newest-first: an
    /// out-of-order older-but-valid message after that point is skipped.
    pub async fn fetch_since(
        &self,
        watermark: DateTime<Utc>,
        max_count: usize,
    ) -> Result<Vec<RawMessage>, SourceError> {
        let result = self.fetch_connected(watermark, max_count).await;

        if let Err(e) = self.source.disconnect().await {
            warn!(source = self.source.name(), error = %e, "Failed to disconnect from source");
        }

        result
    }

    async fn fetch_connected(
        &self,
        watermark: DateTime<Utc>,
        max_count: usize,
    ) -> Result<Vec<RawMessage>, SourceError> {
        self.source.connect().await?;

        let mut stream = self.source.list_messages().await?;
        let mut messages = Vec::new();

        while let Some(item) = stream.next().await {
            let message = item?;
            if message.date < watermark {
                debug!(id = message.id, date = %message.date, "Reached watermark, stopping");
                break;
            }

            let relevant = message
                .text
                .as_deref()
                .is_some_and(|text| self.filter.is_relevant(text));
            if !relevant {
                continue;
            }

            if let Some(raw) = RawMessage::from_source(message) {
                messages.push(raw);
            }
        }

        if messages.len() > max_count {
            warn!(
                found = messages.len(),
                max_count, "Limiting fetched messages to the per-cycle cap"
            );
            messages.truncate(max_count);
        }

        info!(
            source = self.source.name(),
            count = messages.len(),
            since = %watermark,
            "Fetched relevant messages"
        );
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration;

    use super::*;
    use crate::source::types::{MessageStream, SourceMessage};

    /// In-memory source that records connect/disconnect calls.
    struct FakeSource {
        messages: Vec<Result<SourceMessage, SourceError>>,
        fail_connect: bool,
        connects: AtomicUsize,
        disconnects: AtomicUsize,
        taken: Mutex<bool>,
    }

    impl FakeSource {
        fn new(messages: Vec<Result<SourceMessage, SourceError>>) -> Self {
            Self {
                messages,
                fail_connect: false,
                connects: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
                taken: Mutex::new(false),
            }
        }
    }

    #[async_trait]
    impl MessageSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        async fn connect(&self) -> Result<(), SourceError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_connect {
                return Err(SourceError::Connection {
                    reason: "unreachable".into(),
                });
            }
            Ok(())
        }

        async fn list_messages(&self) -> Result<MessageStream, SourceError> {
            *self.taken.lock().unwrap() = true;
            let items: Vec<_> = self
                .messages
                .iter()
                .map(|m| match m {
                    Ok(msg) => Ok(msg.clone()),
                    Err(_) => Err(SourceError::RateLimited { retry_after: None }),
                })
                .collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }

        async fn disconnect(&self) -> Result<(), SourceError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn msg(id: i64, minutes_ago: i64, text: Option<&str>) -> SourceMessage {
        SourceMessage {
            id,
            text: text.map(String::from),
            date: Utc::now() - Duration::minutes(minutes_ago),
            sender_id: None,
            sender_username: None,
            has_media: false,
        }
    }

    fn reader(source: Arc<FakeSource>) -> SourceReader {
        SourceReader::new(source, RelevanceFilter::default())
    }

    #[tokio::test]
    async fn fetch_filters_irrelevant_and_textless() {
        let source = Arc::new(FakeSource::new(vec![
            Ok(msg(5, 1, Some("#offro camera singola"))),
            Ok(msg(4, 2, Some("#cerco casa"))),
            Ok(msg(3, 3, None)),
            Ok(msg(2, 4, Some("Room offered in Bovisa"))),
        ]));
        let watermark = Utc::now() - Duration::minutes(60);

        let messages = reader(source.clone()).fetch_since(watermark, 10).await.unwrap();

        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![5, 2]);
        assert_eq!(source.connects.load(Ordering::SeqCst), 1);
        assert_eq!(source.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_stops_at_first_message_older_than_watermark() {
        let source = Arc::new(FakeSource::new(vec![
            Ok(msg(10, 5, Some("#offro a"))),
            Ok(msg(9, 90, Some("#offro too old"))),
            // Out of order: newer than watermark but after an old one — skipped.
            Ok(msg(8, 10, Some("#offro skipped"))),
        ]));
        let watermark = Utc::now() - Duration::minutes(60);

        let messages = reader(source).fetch_since(watermark, 10).await.unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, 10);
    }

    #[tokio::test]
    async fn fetch_truncates_to_max_count_keeping_newest() {
        let source = Arc::new(FakeSource::new(
            (0..5)
                .map(|i| Ok(msg(100 - i, i, Some("#offro stanza"))))
                .collect(),
        ));
        let watermark = Utc::now() - Duration::minutes(60);

        let messages = reader(source).fetch_since(watermark, 3).await.unwrap();

        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![100, 99, 98]);
    }

    #[tokio::test]
    async fn connect_failure_still_disconnects() {
        let mut fake = FakeSource::new(vec![]);
        fake.fail_connect = true;
        let source = Arc::new(fake);

        let err = reader(source.clone())
            .fetch_since(Utc::now(), 10)
            .await
            .unwrap_err();

        assert!(matches!(err, SourceError::Connection { .. }));
        assert_eq!(source.disconnects.load(Ordering::SeqCst), 1);
        assert!(!*source.taken.lock().unwrap());
    }

    #[tokio::test]
    async fn mid_stream_error_aborts_fetch_and_disconnects() {
        let source = Arc::new(FakeSource::new(vec![
            Ok(msg(3, 1, Some("#offro a"))),
            Err(SourceError::RateLimited { retry_after: None }),
            Ok(msg(1, 2, Some("#offro b"))),
        ]));

        let err = reader(source.clone())
            .fetch_since(Utc::now() - Duration::minutes(60), 10)
            .await
            .unwrap_err();

        assert!(matches!(err, SourceError::RateLimited { .. }));
        assert_eq!(source.disconnects.load(Ordering::SeqCst), 1);
    }
}
