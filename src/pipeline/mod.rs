//! Ingestion pipeline.
//!
//! Each cycle flows through:
//! 1. `SourceReader::fetch_since()` — relevant messages inside the lookback window
//! 2. `AttributeExtractor::extract_batch()` — paced, per-message extraction
//! 3. `Deduplicator::is_duplicate()` — skip messages already stored
//! 4. `PersistenceSink::save()` — write the rental
//!
//! `ScrapePipeline` drives the stages and reports a `CycleResult`.

pub mod dedup;
pub mod orchestrator;
pub mod sink;
pub mod types;

pub use dedup::Deduplicator;
pub use orchestrator::{CycleLimits, ScrapePipeline};
pub use sink::{PersistenceSink, SaveOutcome};
pub use types::{CycleResult, CycleStage, NewRental, RentalRecord};
