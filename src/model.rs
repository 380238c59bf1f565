use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Directives the device understands. Wire and storage names are snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum CommandType {
    StartIgnition,
    StartStarter,
    StopIgnition,
    StopStarter,
    RefuelAdjust,
    ResetCounters,
    PowerSaveOn,
    PowerSaveOff,
}

impl CommandType {
    pub const ALL: [CommandType; 8] = [
        CommandType::StartIgnition,
        CommandType::StartStarter,
        CommandType::StopIgnition,
        CommandType::StopStarter,
        CommandType::RefuelAdjust,
        CommandType::ResetCounters,
        CommandType::PowerSaveOn,
        CommandType::PowerSaveOff,
    ];

    /// Privileged commands change the machine's state and need a PIN first.
    /// Stopping is never gated so the bike can always be shut off.
    pub fn is_privileged(self) -> bool {
        matches!(
            self,
            CommandType::StartIgnition
                | CommandType::StartStarter
                | CommandType::ResetCounters
                | CommandType::PowerSaveOn
                | CommandType::PowerSaveOff
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandType::StartIgnition => "start_ignition",
            CommandType::StartStarter => "start_starter",
            CommandType::StopIgnition => "stop_ignition",
            CommandType::StopStarter => "stop_starter",
            CommandType::RefuelAdjust => "refuel_adjust",
            CommandType::ResetCounters => "reset_counters",
            CommandType::PowerSaveOn => "power_save_on",
            CommandType::PowerSaveOff => "power_save_off",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown command type: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum CommandState {
    Pending,
    Acknowledged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    pub id: i64,
    pub device_id: String,
    pub command_type: CommandType,
    pub value: Option<Value>,
    pub state: CommandState,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// One stored device snapshot. Rows are only ever inserted.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
pub struct TelemetrySample {
    pub id: i64,
    pub device_id: String,
    pub received_at: DateTime<Utc>,
    pub engine_temperature: Option<f64>,
    pub air_temperature: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub fuel_pulses: Option<i64>,
    pub fuel_liters: Option<f64>,
    pub session_distance: Option<f64>,
    pub total_distance: Option<f64>,
    pub session_average_consumption: Option<f64>,
    pub average_consumption: Option<f64>,
    pub range_km: Option<f64>,
    pub battery_voltage: Option<f64>,
    pub backup_battery_voltage: Option<f64>,
}

/// Body of `POST /telemetry`. Only `device_id` is mandatory; numeric fields
/// that are missing, null or not numbers are stored as null.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TelemetryPayload {
    pub device_id: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub engine_temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub air_temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub fuel_pulses: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fuel_liters: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub session_distance: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_distance: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub session_average_consumption: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub average_consumption: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub range_km: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub battery_voltage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub backup_battery_voltage: Option<f64>,
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|n| n.is_finite()))
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

/// Entry of the `GET /commands` response.
#[derive(Debug, Deserialize, Serialize)]
pub struct CommandItem {
    pub id: i64,
    pub command_type: CommandType,
    pub value: Option<Value>,
}

impl From<Command> for CommandItem {
    fn from(command: Command) -> Self {
        Self {
            id: command.id,
            command_type: command.command_type,
            value: command.value,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommandsQuery {
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub device_id: String,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AckRequest {
    pub command_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct OperatorMessage {
    pub session: String,
    pub text: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OperatorReply {
    pub reply: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privileged_set() {
        let privileged: Vec<_> = CommandType::ALL
            .into_iter()
            .filter(|t| t.is_privileged())
            .collect();
        assert_eq!(
            privileged,
            vec![
                CommandType::StartIgnition,
                CommandType::StartStarter,
                CommandType::ResetCounters,
                CommandType::PowerSaveOn,
                CommandType::PowerSaveOff,
            ]
        );
    }

    #[test]
    fn test_command_type_names_match_serde() {
        for t in CommandType::ALL {
            let json = serde_json::to_value(t).unwrap();
            assert_eq!(json, Value::String(t.as_str().to_string()));
            assert_eq!(t.as_str().parse::<CommandType>().unwrap(), t);
        }
        assert!("launch_missiles".parse::<CommandType>().is_err());
    }

    #[test]
    fn test_payload_tolerates_missing_and_garbage_numbers() {
        let payload: TelemetryPayload = serde_json::from_str(
            r#"{
                "device_id": "esp32",
                "engine_temperature": 87.5,
                "air_temperature": "21,5",
                "latitude": null,
                "longitude": "north",
                "fuel_pulses": 1200,
                "firmware": "1.2.3"
            }"#,
        )
        .unwrap();

        assert_eq!(payload.device_id, "esp32");
        assert_eq!(payload.engine_temperature, Some(87.5));
        assert_eq!(payload.air_temperature, Some(21.5));
        assert_eq!(payload.latitude, None);
        assert_eq!(payload.longitude, None);
        assert_eq!(payload.fuel_pulses, Some(1200));
        assert_eq!(payload.range_km, None);
    }

    #[test]
    fn test_out_of_range_pulses_are_null() {
        let payload: TelemetryPayload = serde_json::from_str(
            r#"{"device_id": "esp32", "fuel_pulses": 1e30}"#,
        )
        .unwrap();
        assert_eq!(payload.fuel_pulses, None);

        let payload: TelemetryPayload = serde_json::from_str(
            r#"{"device_id": "esp32", "fuel_pulses": 4200.0}"#,
        )
        .unwrap();
        assert_eq!(payload.fuel_pulses, Some(4200));
    }

    #[test]
    fn test_payload_requires_device_id() {
        let result = serde_json::from_str::<TelemetryPayload>(r#"{"fuel_liters": 3.0}"#);
        assert!(result.is_err());
    }
}
