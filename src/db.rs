use std::collections::HashSet;
use std::str::FromStr;

use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::Result;
use crate::telemetry::TELEMETRY_COLUMNS;

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS telemetry_samples (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        device_id TEXT NOT NULL,
        received_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_telemetry_device ON telemetry_samples (device_id, id)",
    r#"
    CREATE TABLE IF NOT EXISTS commands (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        device_id TEXT NOT NULL,
        command_type TEXT NOT NULL,
        value TEXT,
        state TEXT NOT NULL DEFAULT 'pending',
        created_at TEXT NOT NULL,
        acknowledged_at TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_commands_pending ON commands (device_id, state, id)",
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
];

pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Creates missing tables and adds telemetry columns that an older database
/// does not have yet. Existing rows get NULL in the new columns.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    let existing: HashSet<String> = sqlx::query("PRAGMA table_info(telemetry_samples)")
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| row.try_get::<String, _>("name"))
        .collect::<std::result::Result<_, _>>()?;

    for (column, sql_type) in TELEMETRY_COLUMNS {
        if !existing.contains(*column) {
            info!("adding telemetry column {column}");
            sqlx::query(&format!(
                "ALTER TABLE telemetry_samples ADD COLUMN {column} {sql_type}"
            ))
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

/// Single-connection in-memory database with the schema applied.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
