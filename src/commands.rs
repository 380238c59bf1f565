use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::Value;
use sqlx::sqlite::SqlitePool;

use crate::error::Result;
use crate::model::{Command, CommandState, CommandType};

#[derive(sqlx::FromRow)]
struct CommandRow {
    id: i64,
    device_id: String,
    command_type: CommandType,
    value: Option<String>,
    state: CommandState,
    created_at: DateTime<Utc>,
    acknowledged_at: Option<DateTime<Utc>>,
}

impl From<CommandRow> for Command {
    fn from(row: CommandRow) -> Self {
        let value = row.value.map(|raw| match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(_) => Value::String(raw),
        });
        Command {
            id: row.id,
            device_id: row.device_id,
            command_type: row.command_type,
            value,
            state: row.state,
            created_at: row.created_at,
            acknowledged_at: row.acknowledged_at,
        }
    }
}

/// Durable outbox of device commands. Rows are never deleted; the only
/// mutation is the one-way pending -> acknowledged transition.
#[derive(Clone)]
pub struct CommandQueue {
    pool: SqlitePool,
}

impl CommandQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Always creates a new pending entry, even if an identical one is queued.
    pub async fn enqueue(
        &self,
        device_id: &str,
        command_type: CommandType,
        value: Option<Value>,
    ) -> Result<Command> {
        let raw_value = value.as_ref().map(Value::to_string);
        let row = sqlx::query_as::<_, CommandRow>(
            r#"
            INSERT INTO commands (device_id, command_type, value, state, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING id, device_id, command_type, value, state, created_at, acknowledged_at
            "#,
        )
        .bind(device_id)
        .bind(command_type)
        .bind(raw_value)
        .bind(CommandState::Pending)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        info!("queued command {} ({}) for {}", row.id, command_type, device_id);
        Ok(row.into())
    }

    /// Unacknowledged commands for the device, oldest first.
    pub async fn pending(&self, device_id: &str) -> Result<Vec<Command>> {
        let rows = sqlx::query_as::<_, CommandRow>(
            r#"
            SELECT id, device_id, command_type, value, state, created_at, acknowledged_at
            FROM commands
            WHERE device_id = ?1 AND state = ?2
            ORDER BY id ASC
            "#,
        )
        .bind(device_id)
        .bind(CommandState::Pending)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Command::from).collect())
    }

    /// Returns whether this call performed the transition. Unknown or already
    /// acknowledged ids are a no-op.
    pub async fn acknowledge(&self, command_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commands
            SET state = ?1, acknowledged_at = ?2
            WHERE id = ?3 AND state = ?4
            "#,
        )
        .bind(CommandState::Acknowledged)
        .bind(Utc::now())
        .bind(command_id)
        .bind(CommandState::Pending)
        .execute(&self.pool)
        .await?;

        let transitioned = result.rows_affected() == 1;
        if transitioned {
            info!("command {command_id} acknowledged");
        } else {
            debug!("ack for command {command_id} ignored, unknown or already acknowledged");
        }
        Ok(transitioned)
    }

    pub async fn get(&self, command_id: i64) -> Result<Option<Command>> {
        let row = sqlx::query_as::<_, CommandRow>(
            r#"
            SELECT id, device_id, command_type, value, state, created_at, acknowledged_at
            FROM commands
            WHERE id = ?1
            "#,
        )
        .bind(command_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Command::from))
    }
}
