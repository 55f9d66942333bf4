//! `RentalStore` trait — async interface for rental persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::pipeline::types::RentalRecord;

/// Storage for persisted rental listings.
///
/// Implementations must enforce uniqueness of `source_message_id` and
/// report a violation as `DatabaseError::Constraint`.
#[async_trait]
pub trait RentalStore: Send + Sync {
    /// Create tables and apply pending migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Insert a new rental. Records are never updated afterwards.
    async fn insert_rental(&self, record: &RentalRecord) -> Result<(), DatabaseError>;

    /// Look up a rental by the id of the message it came from.
    async fn find_by_source_id(
        &self,
        source_message_id: i64,
    ) -> Result<Option<RentalRecord>, DatabaseError>;

    async fn get_rental(&self, id: Uuid) -> Result<Option<RentalRecord>, DatabaseError>;

    async fn count_rentals(&self) -> Result<i64, DatabaseError>;
}
