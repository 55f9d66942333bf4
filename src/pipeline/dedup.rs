//! Deduplicator — skip messages that already have a persisted rental.

use std::sync::Arc;

use tracing::debug;

use crate::error::PersistenceError;
use crate::store::RentalStore;

/// Checks the store for an existing rental with the same source message id.
///
/// This is a fast path only; the store's unique constraint is what
/// actually prevents duplicate rows.
pub struct Deduplicator {
    store: Arc<dyn RentalStore>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn RentalStore>) -> Self {
        Self { store }
    }

    /// A rental without a source message id is never a duplicate.
    pub async fn is_duplicate(
        &self,
        source_message_id: Option<i64>,
    ) -> Result<bool, PersistenceError> {
        let Some(id) = source_message_id else {
            return Ok(false);
        };

        let existing = self
            .store
            .find_by_source_id(id)
            .await
            .map_err(|source| PersistenceError::Lookup {
                source_message_id: id,
                source,
            })?;

        if let Some(record) = &existing {
            debug!(source_message_id = id, rental_id = %record.id, "Duplicate message");
        }
        Ok(existing.is_some())
    }
}
