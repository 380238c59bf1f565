use std::fmt::Write;

use chrono::DateTime;

use crate::model::TelemetrySample;

const MISSING: &str = "n/a";

#[derive(Debug, Default)]
pub struct ServiceRecord {
    pub last_oil_change: Option<String>,
    pub last_chain_lube: Option<String>,
}

pub fn render_status(
    latest: Option<&TelemetrySample>,
    online: bool,
    service: &ServiceRecord,
) -> String {
    let mut out = String::new();
    out.push_str(if online { "ESP32 ONLINE" } else { "ESP32 OFFLINE" });
    out.push_str("\n\n");

    let field = |pick: fn(&TelemetrySample) -> Option<f64>| latest.and_then(pick);

    let _ = writeln!(out, "Engine: {}", reading(field(|s| s.engine_temperature), "°C"));
    let _ = writeln!(out, "Air: {}", reading(field(|s| s.air_temperature), "°C"));
    let _ = writeln!(out, "Fuel: {}", reading(field(|s| s.fuel_liters), "L"));
    let _ = writeln!(
        out,
        "Average consumption: {}",
        reading(field(|s| s.average_consumption), "L/100km")
    );
    let _ = writeln!(out, "Range: {}", reading(field(|s| s.range_km), "km"));
    let _ = writeln!(out, "Session: {}", reading(field(|s| s.session_distance), "km"));
    let _ = writeln!(out, "Total: {}", reading(field(|s| s.total_distance), "km"));
    let _ = writeln!(out, "Battery: {}", reading(field(|s| s.battery_voltage), "V"));
    if let Some(sample) = latest {
        let _ = writeln!(out, "Last report: {}", sample.received_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    out.push_str(&render_service(service));
    out
}

pub fn render_service(service: &ServiceRecord) -> String {
    format!(
        "Service: oil changed {}, chain lubed {}",
        service_date(service.last_oil_change.as_deref()),
        service_date(service.last_chain_lube.as_deref()),
    )
}

pub fn render_location(latest: Option<&TelemetrySample>) -> String {
    match latest.and_then(|s| s.latitude.zip(s.longitude)) {
        Some((lat, lon)) => format!("Location: {lat:.6}, {lon:.6}"),
        None => "No coordinates.".to_string(),
    }
}

pub fn reading(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{} {unit}", trim_number(v)),
        None => MISSING.to_string(),
    }
}

fn trim_number(v: f64) -> String {
    let rounded = format!("{v:.2}");
    rounded
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

fn service_date(raw: Option<&str>) -> String {
    match raw {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|_| raw.to_string()),
        None => MISSING.to_string(),
    }
}
