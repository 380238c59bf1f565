use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqlitePool;

use crate::auth::{Authorization, AuthorizationGate};
use crate::commands::CommandQueue;
use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::model::{Command, CommandType, TelemetryPayload, TelemetrySample};
use crate::settings::SettingsStore;
use crate::staleness::StalenessMonitor;
use crate::telemetry::TelemetryStore;

/// The only way the HTTP handlers and the operator console reach storage.
/// Every read goes to the database; nothing is cached between requests.
pub struct DeviceBridge {
    telemetry: TelemetryStore,
    commands: CommandQueue,
    settings: SettingsStore,
    monitor: StalenessMonitor,
    gate: AuthorizationGate,
}

impl DeviceBridge {
    pub fn new(pool: SqlitePool, config: &Config) -> Self {
        let telemetry = TelemetryStore::new(pool.clone());
        Self {
            monitor: StalenessMonitor::new(telemetry.clone(), config.staleness_threshold),
            telemetry,
            commands: CommandQueue::new(pool.clone()),
            settings: SettingsStore::new(pool),
            gate: AuthorizationGate::new(config.pin_code.clone(), config.pin_timeout),
        }
    }

    pub async fn receive_telemetry(&self, payload: &TelemetryPayload) -> Result<TelemetrySample> {
        self.telemetry.ingest(payload).await
    }

    pub async fn latest_telemetry(&self, device_id: &str) -> Result<Option<TelemetrySample>> {
        self.telemetry.latest(device_id).await
    }

    pub async fn telemetry_history(
        &self,
        device_id: &str,
        limit: u32,
    ) -> Result<Vec<TelemetrySample>> {
        self.telemetry.history(device_id, limit).await
    }

    pub async fn is_online(&self, device_id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.monitor.is_online(device_id, now).await
    }

    pub async fn list_outstanding_commands(&self, device_id: &str) -> Result<Vec<Command>> {
        self.commands.pending(device_id).await
    }

    pub async fn acknowledge_command(&self, command_id: i64) -> Result<bool> {
        self.commands.acknowledge(command_id).await
    }

    pub async fn command(&self, command_id: i64) -> Result<Option<Command>> {
        self.commands.get(command_id).await
    }

    /// Privileged command types need a grant for that same type.
    pub async fn issue_command(
        &self,
        device_id: &str,
        command_type: CommandType,
        value: Option<Value>,
        authorization: Option<Authorization>,
    ) -> Result<Command> {
        if command_type.is_privileged() {
            match authorization {
                Some(grant) if grant.action() == command_type => {}
                _ => return Err(BridgeError::Unauthorized(command_type)),
            }
        }
        self.commands.enqueue(device_id, command_type, value).await
    }

    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        http_host: "127.0.0.1".to_string(),
        http_port: 0,
        database_url: "sqlite::memory:".to_string(),
        db_max_connections: 1,
        device_id: "esp32".to_string(),
        pin_code: "8748".to_string(),
        staleness_threshold: std::time::Duration::from_secs(70),
        pin_timeout: std::time::Duration::from_secs(120),
    }
}

#[cfg(test)]
pub(crate) async fn test_bridge() -> DeviceBridge {
    DeviceBridge::new(crate::db::test_pool().await, &test_config())
}
