//! Attribute extraction — raw listing text to typed rental attributes.
//!
//! `AttributeExtractor` builds a prompt, asks an `ExtractionService` for a
//! JSON object, and normalizes the answer into `ExtractedAttributes`.
//! Extraction never fails a batch: a failed call yields
//! `Extraction::Degraded` carrying the original text.

pub mod client;
pub mod extractor;
pub mod prompt;
pub mod response;
pub mod types;

pub use client::{ExtractionService, RigExtractionService, create_mistral_service};
pub use extractor::{AttributeExtractor, Extraction};
pub use response::parse_llm_response;
pub use types::{
    ExtractedAttributes, PropertyType, TenantPreference, normalize_tenant_preference, parse_date,
};
