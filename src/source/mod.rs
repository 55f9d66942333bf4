//! Source reading — messaging channel I/O and relevance filtering.
//!
//! A scrape cycle reads the source through:
//! 1. `MessageSource` — channel-specific I/O (connect, list newest-first, disconnect)
//! 2. `RelevanceFilter` — cheap tag/keyword match, no LLM
//! 3. `SourceReader::fetch_since()` — watermark early-stop and batch cap

pub mod filter;
pub mod reader;
pub mod telegram;
pub mod types;

pub use filter::RelevanceFilter;
pub use reader::SourceReader;
pub use telegram::TelegramSource;
pub use types::{MessageSource, MessageStream, RawMessage, SourceMessage};
