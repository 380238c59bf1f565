use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::telemetry::TelemetryStore;

/// Derives online/offline from the age of the last telemetry receipt.
#[derive(Clone)]
pub struct StalenessMonitor {
    store: TelemetryStore,
    threshold: Duration,
}

impl StalenessMonitor {
    pub fn new(store: TelemetryStore, threshold: Duration) -> Self {
        Self { store, threshold }
    }

    pub async fn is_online(&self, device_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let latest = self.store.latest(device_id).await?;
        Ok(latest.is_some_and(|sample| is_fresh(sample.received_at, now, self.threshold)))
    }
}

/// `now - received_at < threshold`. A sample exactly `threshold` old is stale.
/// Samples stamped after `now` count as fresh.
pub fn is_fresh(received_at: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> bool {
    match (now - received_at).to_std() {
        Ok(age) => age < threshold,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::model::TelemetryPayload;
    use chrono::TimeZone;

    const THRESHOLD: Duration = Duration::from_secs(70);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_boundary() {
        let t = t0();
        let delta = chrono::Duration::seconds(70);
        let second = chrono::Duration::seconds(1);

        assert!(is_fresh(t, t, THRESHOLD));
        assert!(is_fresh(t, t + delta - second, THRESHOLD));
        assert!(!is_fresh(t, t + delta, THRESHOLD));
        assert!(!is_fresh(t, t + delta + second, THRESHOLD));
    }

    #[test]
    fn test_future_sample_is_fresh() {
        assert!(is_fresh(t0() + chrono::Duration::seconds(5), t0(), THRESHOLD));
    }

    #[actix_web::test]
    async fn test_is_online_reads_latest_sample() {
        let store = TelemetryStore::new(test_pool().await);
        let monitor = StalenessMonitor::new(store.clone(), THRESHOLD);

        assert!(!monitor.is_online("esp32", t0()).await.unwrap());

        let payload = TelemetryPayload {
            device_id: "esp32".to_string(),
            ..Default::default()
        };
        store.ingest_at(&payload, t0()).await.unwrap();

        assert!(monitor
            .is_online("esp32", t0() + chrono::Duration::seconds(69))
            .await
            .unwrap());
        assert!(!monitor
            .is_online("esp32", t0() + chrono::Duration::seconds(71))
            .await
            .unwrap());
    }
}
