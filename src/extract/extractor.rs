//! Attribute extractor — turns one raw listing into typed attributes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::ExtractionError;
use crate::extract::client::ExtractionService;
use crate::extract::prompt::build_extraction_prompt;
use crate::extract::response::parse_llm_response;
use crate::extract::types::ExtractedAttributes;
use crate::source::RawMessage;

/// Outcome of extracting one message.
#[derive(Debug)]
pub enum Extraction {
    /// The service answered. Attributes may be empty if the answer was
    /// not usable JSON.
    Parsed {
        message: RawMessage,
        attributes: ExtractedAttributes,
    },
    /// The service call failed. The original text is kept for reporting.
    Degraded {
        message: RawMessage,
        error: ExtractionError,
    },
}

impl Extraction {
    pub fn message(&self) -> &RawMessage {
        match self {
            Self::Parsed { message, .. } | Self::Degraded { message, .. } => message,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed { .. })
    }
}

/// Extracts listing attributes through an `ExtractionService`.
pub struct AttributeExtractor {
    service: Arc<dyn ExtractionService>,
    delay: Duration,
}

impl AttributeExtractor {
    /// `delay` is the pause between consecutive service calls in a batch.
    pub fn new(service: Arc<dyn ExtractionService>, delay: Duration) -> Self {
        Self { service, delay }
    }

    /// Extract attributes from a single message. Never fails: service
    /// errors produce `Extraction::Degraded`.
    pub async fn extract(&self, message: &RawMessage) -> Extraction {
        let prompt = build_extraction_prompt(&message.text);

        match self.service.complete_json(&prompt).await {
            Ok(response) => {
                let map = parse_llm_response(&response);
                let attributes = ExtractedAttributes::from_json(&map);
                if attributes.is_empty() {
                    debug!(message_id = message.id, "Extraction produced no attributes");
                }
                Extraction::Parsed {
                    message: message.clone(),
                    attributes,
                }
            }
            Err(error) => {
                warn!(
                    message_id = message.id,
                    model = self.service.model_name(),
                    error = %error,
                    "Extraction failed"
                );
                Extraction::Degraded {
                    message: message.clone(),
                    error,
                }
            }
        }
    }

    /// Extract a batch sequentially, pausing between calls.
    ///
    /// Results come back in input order. No pause precedes the first call.
    pub async fn extract_batch(&self, messages: &[RawMessage]) -> Vec<Extraction> {
        let mut results = Vec::with_capacity(messages.len());

        for (i, message) in messages.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            results.push(self.extract(message).await);
            debug!(done = i + 1, total = messages.len(), "Extraction progress");
        }

        let parsed = results.iter().filter(|r| r.is_parsed()).count();
        info!(
            total = messages.len(),
            parsed,
            failed = messages.len() - parsed,
            "Extraction batch complete"
        );
        results
    }
}
