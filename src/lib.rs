//! Rental Scout — rental-listing ingestion from a messaging channel.
//!
//! Each scrape cycle reads recent channel posts, extracts structured
//! attributes with a language model, and stores new listings in libSQL.

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod scheduler;
pub mod source;
pub mod store;
