//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;
use tracing::info;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "rentals",
    sql: r#"
            CREATE TABLE IF NOT EXISTS rentals (
                id TEXT PRIMARY KEY,
                source_message_id INTEGER UNIQUE,
                sender_id INTEGER,
                sender_username TEXT,
                message_date TEXT NOT NULL,
                raw_text TEXT NOT NULL,
                has_media INTEGER NOT NULL DEFAULT 0,
                price REAL,
                location TEXT,
                property_type TEXT,
                telephone TEXT,
                email TEXT,
                tenant_preference TEXT NOT NULL DEFAULT 'indifferent',
                available_start TEXT,
                available_end TEXT,
                num_bedrooms INTEGER,
                num_bathrooms INTEGER,
                flatmates_count INTEGER,
                summary TEXT,
                has_extra_expenses INTEGER,
                extra_expenses_details TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_rentals_price ON rentals(price);
            CREATE INDEX IF NOT EXISTS idx_rentals_location ON rentals(location);
            CREATE INDEX IF NOT EXISTS idx_rentals_property_type ON rentals(property_type);
            CREATE INDEX IF NOT EXISTS idx_rentals_tenant_preference ON rentals(tenant_preference);
            CREATE INDEX IF NOT EXISTS idx_rentals_message_date ON rentals(message_date);
            CREATE INDEX IF NOT EXISTS idx_rentals_sender ON rentals(sender_id);
        "#,
}];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    info!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get::<i64>(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
