//! Persistence sink — writes one rental at a time.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{DatabaseError, PersistenceError};
use crate::pipeline::types::{NewRental, RentalRecord};
use crate::store::RentalStore;

/// Result of a successful save call.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved(RentalRecord),
    /// The store already held a rental for this source message.
    Duplicate { source_message_id: Option<i64> },
}

/// Assigns ids and writes rentals to a `RentalStore`.
pub struct PersistenceSink {
    store: Arc<dyn RentalStore>,
}

impl PersistenceSink {
    pub fn new(store: Arc<dyn RentalStore>) -> Self {
        Self { store }
    }

    /// Persist a rental and return its stored form.
    ///
    /// A unique-constraint violation is reported as `SaveOutcome::Duplicate`,
    /// not as an error. Any other failure is scoped to this record.
    pub async fn save(&self, rental: NewRental) -> Result<SaveOutcome, PersistenceError> {
        let record = RentalRecord::new(rental);
        let source_message_id = record.source_message_id();

        match self.store.insert_rental(&record).await {
            Ok(()) => {
                info!(
                    rental_id = %record.id,
                    source_message_id = ?source_message_id,
                    "Rental saved"
                );
                Ok(SaveOutcome::Saved(record))
            }
            Err(DatabaseError::Constraint(reason)) => {
                debug!(source_message_id = ?source_message_id, %reason, "Rental already stored");
                Ok(SaveOutcome::Duplicate { source_message_id })
            }
            Err(source) => Err(PersistenceError::Write {
                source_message_id,
                source,
            }),
        }
    }
}
