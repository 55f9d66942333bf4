//! Extraction service seam and the rig-core backed Mistral adapter.
//!
//! rig-core owns the HTTP transport. `RigExtractionService` bridges rig's
//! `CompletionModel` to our `ExtractionService` trait and forces Mistral's
//! JSON-object response mode through the request's additional params.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rig::OneOrMany;
use rig::client::CompletionClient;
use rig::completion::message::{AssistantContent, Message};
use rig::completion::{CompletionError, CompletionModel};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::debug;

use crate::error::ExtractionError;

/// A language-model service able to answer a prompt with a JSON object.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Send one user prompt in JSON-object response mode.
    ///
    /// Returns the raw response content, which may still be fenced or
    /// malformed.
    async fn complete_json(&self, prompt: &str) -> Result<String, ExtractionError>;
}

/// Create the Mistral-backed extraction service.
pub fn create_mistral_service(
    api_key: &SecretString,
    model: &str,
    request_timeout: Duration,
) -> Result<Arc<dyn ExtractionService>, ExtractionError> {
    use rig::providers::mistral;

    let client: rig::client::Client<mistral::client::MistralExt> =
        mistral::Client::new(api_key.expose_secret()).map_err(|e| {
            ExtractionError::Request(format!("Failed to create Mistral client: {e}"))
        })?;

    let completion_model = client.completion_model(model);
    tracing::info!("Using Mistral (model: {})", model);
    Ok(Arc::new(RigExtractionService::new(
        completion_model,
        model,
        request_timeout,
    )))
}

/// Adapter from a rig `CompletionModel` to `ExtractionService`.
pub struct RigExtractionService<M> {
    model: M,
    model_name: String,
    request_timeout: Duration,
}

impl<M> RigExtractionService<M> {
    pub fn new(model: M, model_name: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            request_timeout,
        }
    }
}

#[async_trait]
impl<M> ExtractionService for RigExtractionService<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete_json(&self, prompt: &str) -> Result<String, ExtractionError> {
        let request = self
            .model
            .completion_request(Message::user(prompt))
            .additional_params(json!({ "response_format": { "type": "json_object" } }))
            .send();

        let response = tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| ExtractionError::Timeout)?
            .map_err(map_completion_error)?;

        let content = response_text(&response.choice);
        if content.trim().is_empty() {
            return Err(ExtractionError::EmptyResponse);
        }

        debug!(model = %self.model_name, len = content.len(), "Extraction response received");
        Ok(content)
    }
}

/// Concatenate the text parts of an assistant turn.
fn response_text(choice: &OneOrMany<AssistantContent>) -> String {
    choice
        .iter()
        .filter_map(|content| match content {
            AssistantContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect()
}

fn map_completion_error(e: CompletionError) -> ExtractionError {
    classify_failure(e.to_string())
}

/// rig reports provider failures as text; recognise rate limiting in it.
fn classify_failure(message: String) -> ExtractionError {
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
    {
        ExtractionError::RateLimited { retry_after: None }
    } else {
        ExtractionError::Provider(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_text_joins_text_parts() {
        let choice = OneOrMany::many(vec![
            AssistantContent::text("{\"price\":"),
            AssistantContent::text("1}"),
        ])
        .unwrap();
        assert_eq!(response_text(&choice), "{\"price\":1}");
    }

    #[test]
    fn response_text_single_part() {
        let choice = OneOrMany::one(AssistantContent::text("{}"));
        assert_eq!(response_text(&choice), "{}");
    }

    #[test]
    fn rate_limit_messages_map_to_rate_limited() {
        assert!(matches!(
            classify_failure("ProviderError: 429 Too Many Requests".into()),
            ExtractionError::RateLimited { retry_after: None }
        ));
        assert!(matches!(
            classify_failure("Rate limit exceeded".into()),
            ExtractionError::RateLimited { .. }
        ));
    }

    #[test]
    fn other_failures_keep_provider_message() {
        let err = classify_failure("ProviderError: invalid model".into());
        assert!(matches!(&err, ExtractionError::Provider(m) if m.contains("invalid model")));
    }

    #[test]
    fn create_service_with_any_key() {
        // rig-core clients accept any string as API key at construction time.
        let service = create_mistral_service(
            &SecretString::from("test-key"),
            "pixtral-12b-2409",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(service.model_name(), "pixtral-12b-2409");
    }
}
