use chrono::{DateTime, Utc};
use log::info;
use sqlx::sqlite::SqlitePool;

use crate::error::{BridgeError, Result};
use crate::model::{TelemetryPayload, TelemetrySample};

/// Optional telemetry columns. New fields are appended here and picked up by
/// `db::migrate` as nullable columns.
pub const TELEMETRY_COLUMNS: &[(&str, &str)] = &[
    ("engine_temperature", "REAL"),
    ("air_temperature", "REAL"),
    ("latitude", "REAL"),
    ("longitude", "REAL"),
    ("fuel_pulses", "INTEGER"),
    ("fuel_liters", "REAL"),
    ("session_distance", "REAL"),
    ("total_distance", "REAL"),
    ("session_average_consumption", "REAL"),
    ("average_consumption", "REAL"),
    ("range_km", "REAL"),
    ("battery_voltage", "REAL"),
    ("backup_battery_voltage", "REAL"),
];

/// Append-only log of device snapshots.
#[derive(Clone)]
pub struct TelemetryStore {
    pool: SqlitePool,
}

impl TelemetryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn ingest(&self, payload: &TelemetryPayload) -> Result<TelemetrySample> {
        self.ingest_at(payload, Utc::now()).await
    }

    pub async fn ingest_at(
        &self,
        payload: &TelemetryPayload,
        received_at: DateTime<Utc>,
    ) -> Result<TelemetrySample> {
        let device_id = payload.device_id.trim();
        if device_id.is_empty() {
            return Err(BridgeError::InvalidPayload(
                "device_id must not be empty".to_string(),
            ));
        }

        let sample = sqlx::query_as::<_, TelemetrySample>(
            r#"
            INSERT INTO telemetry_samples
            (device_id, received_at, engine_temperature, air_temperature, latitude, longitude,
             fuel_pulses, fuel_liters, session_distance, total_distance,
             session_average_consumption, average_consumption, range_km,
             battery_voltage, backup_battery_voltage)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            RETURNING *
            "#,
        )
        .bind(device_id)
        .bind(received_at)
        .bind(payload.engine_temperature)
        .bind(payload.air_temperature)
        .bind(payload.latitude)
        .bind(payload.longitude)
        .bind(payload.fuel_pulses)
        .bind(payload.fuel_liters)
        .bind(payload.session_distance)
        .bind(payload.total_distance)
        .bind(payload.session_average_consumption)
        .bind(payload.average_consumption)
        .bind(payload.range_km)
        .bind(payload.battery_voltage)
        .bind(payload.backup_battery_voltage)
        .fetch_one(&self.pool)
        .await?;

        info!("stored telemetry sample {} for {}", sample.id, sample.device_id);
        Ok(sample)
    }

    /// Most recently inserted sample, read through the (device_id, id) index.
    pub async fn latest(&self, device_id: &str) -> Result<Option<TelemetrySample>> {
        let sample = sqlx::query_as::<_, TelemetrySample>(
            r#"
            SELECT * FROM telemetry_samples
            WHERE device_id = ?1
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sample)
    }

    /// Newest first.
    pub async fn history(&self, device_id: &str, limit: u32) -> Result<Vec<TelemetrySample>> {
        let samples = sqlx::query_as::<_, TelemetrySample>(
            r#"
            SELECT * FROM telemetry_samples
            WHERE device_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn payload(device_id: &str, fuel_liters: f64) -> TelemetryPayload {
        TelemetryPayload {
            device_id: device_id.to_string(),
            fuel_liters: Some(fuel_liters),
            ..Default::default()
        }
    }

    #[actix_web::test]
    async fn test_latest_is_last_inserted() {
        let store = TelemetryStore::new(test_pool().await);

        for i in 1..=5 {
            store.ingest(&payload("esp32", i as f64)).await.unwrap();
        }

        let latest = store.latest("esp32").await.unwrap().unwrap();
        assert_eq!(latest.fuel_liters, Some(5.0));

        let history = store.history("esp32", 100).await.unwrap();
        let liters: Vec<_> = history.iter().map(|s| s.fuel_liters).collect();
        assert_eq!(
            liters,
            vec![Some(5.0), Some(4.0), Some(3.0), Some(2.0), Some(1.0)]
        );
    }

    #[actix_web::test]
    async fn test_latest_without_data() {
        let store = TelemetryStore::new(test_pool().await);
        assert!(store.latest("esp32").await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn test_devices_are_separate() {
        let store = TelemetryStore::new(test_pool().await);
        store.ingest(&payload("a", 1.0)).await.unwrap();
        store.ingest(&payload("b", 2.0)).await.unwrap();

        assert_eq!(store.latest("a").await.unwrap().unwrap().fuel_liters, Some(1.0));
        assert_eq!(store.latest("b").await.unwrap().unwrap().fuel_liters, Some(2.0));
    }

    #[actix_web::test]
    async fn test_missing_fields_are_null() {
        let store = TelemetryStore::new(test_pool().await);
        let sample = store
            .ingest(&TelemetryPayload {
                device_id: "esp32".to_string(),
                latitude: Some(50.45),
                longitude: Some(30.52),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(sample.latitude, Some(50.45));
        assert_eq!(sample.engine_temperature, None);
        assert_eq!(sample.fuel_pulses, None);
    }

    #[actix_web::test]
    async fn test_blank_device_id_is_rejected_and_not_stored() {
        let store = TelemetryStore::new(test_pool().await);
        let result = store.ingest(&payload("   ", 1.0)).await;

        assert!(matches!(result, Err(BridgeError::InvalidPayload(_))));
        assert!(store.history("   ", 10).await.unwrap().is_empty());
        assert!(store.history("", 10).await.unwrap().is_empty());
    }
}
