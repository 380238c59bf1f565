use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{BridgeError, Result};

pub const DEFAULT_STALENESS_SECS: u64 = 70;
pub const DEFAULT_PIN_TIMEOUT_SECS: u64 = 120;

/// Loaded once at startup and shared read-only with every worker.
#[derive(Clone, Debug)]
pub struct Config {
    pub http_host: String,
    pub http_port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub device_id: String,
    pub pin_code: String,
    pub staleness_threshold: Duration,
    /// How long an unanswered PIN prompt stays open.
    pub pin_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pin_code = lookup("PIN_CODE")
            .map(|pin| pin.trim().to_string())
            .filter(|pin| !pin.is_empty())
            .ok_or_else(|| BridgeError::Config("PIN_CODE must be set".to_string()))?;

        Ok(Config {
            http_host: lookup("HTTP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            http_port: parse_or(&lookup, "HTTP_PORT", 5000)?,
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:moto.db?mode=rwc".to_string()),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?,
            device_id: lookup("DEVICE_ID").unwrap_or_else(|| "esp32".to_string()),
            pin_code,
            staleness_threshold: Duration::from_secs(parse_or(
                &lookup,
                "STALENESS_THRESHOLD_SECS",
                DEFAULT_STALENESS_SECS,
            )?),
            pin_timeout: Duration::from_secs(parse_or(
                &lookup,
                "PIN_TIMEOUT_SECS",
                DEFAULT_PIN_TIMEOUT_SECS,
            )?),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| BridgeError::Config(format!("{key} must be a valid number, got {raw:?}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[("PIN_CODE", "8748")])).unwrap();

        assert_eq!(config.http_port, 5000);
        assert_eq!(config.device_id, "esp32");
        assert_eq!(config.pin_code, "8748");
        assert_eq!(config.staleness_threshold, Duration::from_secs(70));
        assert_eq!(config.pin_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("PIN_CODE", "1111"),
            ("HTTP_PORT", "8080"),
            ("DEVICE_ID", "shadow"),
            ("STALENESS_THRESHOLD_SECS", "180"),
            ("PIN_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();

        assert_eq!(config.http_port, 8080);
        assert_eq!(config.device_id, "shadow");
        assert_eq!(config.staleness_threshold, Duration::from_secs(180));
        assert_eq!(config.pin_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_pin_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[("PIN_CODE", "  ")]));
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_bad_port_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[("PIN_CODE", "1"), ("HTTP_PORT", "http")]));
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }
}
