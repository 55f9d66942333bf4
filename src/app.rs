//! Wiring: builds the store, source, extractor and pipeline from config.

use std::sync::Arc;

use tracing::info;

use crate::config::ScraperConfig;
use crate::error::Result;
use crate::extract::{AttributeExtractor, create_mistral_service};
use crate::pipeline::{CycleLimits, ScrapePipeline};
use crate::source::{RelevanceFilter, SourceReader, TelegramSource};
use crate::store::{LibSqlBackend, RentalStore};

/// Everything the binary needs to run cycles.
pub struct ScraperApp {
    pub pipeline: Arc<ScrapePipeline>,
    pub store: Arc<dyn RentalStore>,
}

/// Open the database and assemble the pipeline.
pub async fn build(config: &ScraperConfig) -> Result<ScraperApp> {
    let store: Arc<dyn RentalStore> =
        Arc::new(LibSqlBackend::new_local(&config.database_path).await?);

    let source = Arc::new(TelegramSource::new(
        config.telegram_bot_token.clone(),
        config.channel_name.clone(),
        config.request_timeout,
    )?);
    let reader = SourceReader::new(source, RelevanceFilter::new(&config.filter));

    let service = create_mistral_service(
        &config.mistral_api_key,
        &config.mistral_model,
        config.request_timeout,
    )?;
    let extractor = AttributeExtractor::new(service, config.extraction_delay);

    let pipeline = Arc::new(ScrapePipeline::new(
        reader,
        extractor,
        Arc::clone(&store),
        CycleLimits {
            lookback: config.lookback,
            max_messages: config.max_messages,
        },
    ));

    info!(channel = %config.channel_name, "Scraper assembled");
    Ok(ScraperApp { pipeline, store })
}
