//! libSQL backend — async `RentalStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Value, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::extract::{
    ExtractedAttributes, PropertyType, TenantPreference, normalize_tenant_preference,
};
use crate::pipeline::types::{NewRental, RentalRecord};
use crate::store::migrations;
use crate::store::traits::RentalStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests and dry runs).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_one(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Option<RentalRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_rental(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Serialization(format!("{op} row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|ndt| ndt.and_utc())
}

fn parse_stored_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> Value {
    match s {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

fn opt_int(n: Option<i64>) -> Value {
    n.map_or(Value::Null, Value::Integer)
}

fn opt_count(n: Option<u32>) -> Value {
    opt_int(n.map(i64::from))
}

fn opt_real(n: Option<f64>) -> Value {
    n.map_or(Value::Null, Value::Real)
}

fn opt_bool(b: Option<bool>) -> Value {
    opt_int(b.map(i64::from))
}

fn opt_date(d: Option<NaiveDate>) -> Value {
    d.map_or(Value::Null, |d| Value::Text(d.format("%Y-%m-%d").to_string()))
}

fn value_text(v: Value) -> Option<String> {
    match v {
        Value::Text(s) => Some(s),
        _ => None,
    }
}

fn value_int(v: Value) -> Option<i64> {
    match v {
        Value::Integer(n) => Some(n),
        Value::Real(f) if f.fract() == 0.0 => Some(f as i64),
        _ => None,
    }
}

fn value_real(v: Value) -> Option<f64> {
    match v {
        Value::Real(f) => Some(f),
        Value::Integer(n) => Some(n as f64),
        _ => None,
    }
}

fn value_count(v: Value) -> Option<u32> {
    value_int(v).and_then(|n| u32::try_from(n).ok())
}

/// Map a write error, separating unique-constraint violations.
fn write_error(op: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{op}: {msg}"))
    } else {
        DatabaseError::Query(format!("{op}: {msg}"))
    }
}

/// Map a libsql Row to a RentalRecord.
///
/// Column order matches RENTAL_COLUMNS.
fn row_to_rental(row: &libsql::Row) -> Result<RentalRecord, libsql::Error> {
    let col = |i: i32| row.get_value(i);

    let id_str: String = row.get(0)?;
    let message_date_str: String = row.get(4)?;
    let created_str: String = row.get(21)?;

    let attributes = ExtractedAttributes {
        price: value_real(col(7)?),
        location: value_text(col(8)?),
        property_type: value_text(col(9)?).and_then(|s| s.parse::<PropertyType>().ok()),
        telephone: value_text(col(10)?),
        email: value_text(col(11)?),
        tenant_preference: value_text(col(12)?)
            .map(|s| normalize_tenant_preference(Some(&s)))
            .unwrap_or(TenantPreference::Indifferent),
        available_start: value_text(col(13)?).as_deref().and_then(parse_stored_date),
        available_end: value_text(col(14)?).as_deref().and_then(parse_stored_date),
        num_bedrooms: value_count(col(15)?),
        num_bathrooms: value_count(col(16)?),
        flatmates_count: value_count(col(17)?),
        summary: value_text(col(18)?),
        has_extra_expenses: value_int(col(19)?).map(|n| n != 0),
        extra_expenses_details: value_text(col(20)?),
    };

    Ok(RentalRecord {
        id: id_str.parse().unwrap_or_default(),
        rental: NewRental {
            source_message_id: value_int(col(1)?),
            sender_id: value_int(col(2)?),
            sender_username: value_text(col(3)?),
            message_date: parse_datetime(&message_date_str).unwrap_or(DateTime::<Utc>::MIN_UTC),
            raw_text: row.get(5)?,
            has_media: value_int(col(6)?).is_some_and(|n| n != 0),
            attributes,
        },
        created_at: parse_datetime(&created_str).unwrap_or(DateTime::<Utc>::MIN_UTC),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const RENTAL_COLUMNS: &str = "id, source_message_id, sender_id, sender_username, message_date, \
     raw_text, has_media, price, location, property_type, telephone, email, tenant_preference, \
     available_start, available_end, num_bedrooms, num_bathrooms, flatmates_count, summary, \
     has_extra_expenses, extra_expenses_details, created_at";

#[async_trait]
impl RentalStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn insert_rental(&self, record: &RentalRecord) -> Result<(), DatabaseError> {
        let rental = &record.rental;
        let attrs = &rental.attributes;

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO rentals ({RENTAL_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)"
                ),
                params![
                    record.id.to_string(),
                    opt_int(rental.source_message_id),
                    opt_int(rental.sender_id),
                    opt_text(rental.sender_username.as_deref()),
                    rental.message_date.to_rfc3339(),
                    rental.raw_text.as_str(),
                    i64::from(rental.has_media),
                    opt_real(attrs.price),
                    opt_text(attrs.location.as_deref()),
                    opt_text(attrs.property_type.map(|p| p.as_str())),
                    opt_text(attrs.telephone.as_deref()),
                    opt_text(attrs.email.as_deref()),
                    attrs.tenant_preference.as_str(),
                    opt_date(attrs.available_start),
                    opt_date(attrs.available_end),
                    opt_count(attrs.num_bedrooms),
                    opt_count(attrs.num_bathrooms),
                    opt_count(attrs.flatmates_count),
                    opt_text(attrs.summary.as_deref()),
                    opt_bool(attrs.has_extra_expenses),
                    opt_text(attrs.extra_expenses_details.as_deref()),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("insert_rental", e))?;

        debug!(
            rental_id = %record.id,
            source_message_id = ?rental.source_message_id,
            "Rental inserted into DB"
        );
        Ok(())
    }

    async fn find_by_source_id(
        &self,
        source_message_id: i64,
    ) -> Result<Option<RentalRecord>, DatabaseError> {
        self.query_one(
            "find_by_source_id",
            &format!("SELECT {RENTAL_COLUMNS} FROM rentals WHERE source_message_id = ?1"),
            params![source_message_id],
        )
        .await
    }

    async fn get_rental(&self, id: Uuid) -> Result<Option<RentalRecord>, DatabaseError> {
        self.query_one(
            "get_rental",
            &format!("SELECT {RENTAL_COLUMNS} FROM rentals WHERE id = ?1"),
            params![id.to_string()],
        )
        .await
    }

    async fn count_rentals(&self) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM rentals", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count_rentals: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| DatabaseError::Query(format!("count_rentals: {e}"))),
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_rentals: {e}"))),
        }
    }
}
