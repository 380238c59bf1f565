use chrono::Utc;
use log::info;
use serde_json::json;

use crate::auth::Resolution;
use crate::bridge::DeviceBridge;
use crate::error::Result;
use crate::model::CommandType;
use crate::settings::{SERVICE_CHAIN, SERVICE_OIL};
use crate::status::{self, ServiceRecord};

pub const HELP: &str = "\
/status - full status
/location - last known coordinates
/fuel - fuel remaining
/refuel 5 - add 5 liters
/ignite - ignition on (PIN)
/starter - start the engine (PIN)
/stop - ignition off
/stop_starter - release the starter
/reset - reset trip counters (PIN)
/power_save on|off - power saving mode (PIN)
/service - maintenance reminder
/service_oil_reset - oil changed today
/service_chain_reset - chain lubed today
/cancel - abort a PIN prompt
/help - this list";

/// Text command interpreter for the operator's chat. Owns no state of its
/// own: PIN challenges live in the bridge's authorization gate.
pub struct OperatorConsole<'a> {
    bridge: &'a DeviceBridge,
    device_id: &'a str,
}

impl<'a> OperatorConsole<'a> {
    pub fn new(bridge: &'a DeviceBridge, device_id: &'a str) -> Self {
        Self { bridge, device_id }
    }

    pub async fn handle(&self, session: &str, text: &str) -> Result<String> {
        let text = text.trim();

        // An open PIN prompt swallows the next message, whatever it is.
        if let Some(action) = self.bridge.gate().awaiting(session) {
            if is_cancel(text) {
                self.bridge.gate().cancel(session);
                info!("PIN prompt for {action} cancelled in session {session}");
                return Ok("Cancelled.".to_string());
            }
            return self.resolve_pin(session, text).await;
        }

        let mut words = text.split_whitespace();
        let command = words.next().unwrap_or_default();
        let argument = words.next();

        match command {
            "/start" | "/help" => Ok(HELP.to_string()),
            "/status" => self.status().await,
            "/location" => {
                let latest = self.bridge.latest_telemetry(self.device_id).await?;
                Ok(status::render_location(latest.as_ref()))
            }
            "/fuel" => {
                let latest = self.bridge.latest_telemetry(self.device_id).await?;
                let liters = latest.and_then(|s| s.fuel_liters);
                Ok(format!("Fuel remaining: {}", status::reading(liters, "L")))
            }
            "/refuel" => self.refuel(argument).await,
            "/ignite" => Ok(self.challenge(session, CommandType::StartIgnition)),
            "/starter" => Ok(self.challenge(session, CommandType::StartStarter)),
            "/reset" => Ok(self.challenge(session, CommandType::ResetCounters)),
            "/power_save" => match argument {
                Some("on") => Ok(self.challenge(session, CommandType::PowerSaveOn)),
                Some("off") => Ok(self.challenge(session, CommandType::PowerSaveOff)),
                _ => Ok("Usage: /power_save on|off".to_string()),
            },
            "/stop" => {
                self.bridge
                    .issue_command(self.device_id, CommandType::StopIgnition, None, None)
                    .await?;
                Ok("Ignition off queued.".to_string())
            }
            "/stop_starter" => {
                self.bridge
                    .issue_command(self.device_id, CommandType::StopStarter, None, None)
                    .await?;
                Ok("Starter release queued.".to_string())
            }
            "/service" => Ok(status::render_service(&self.service_record().await?)),
            "/service_oil_reset" => {
                self.bridge.settings().set(SERVICE_OIL, &Utc::now().to_rfc3339()).await?;
                Ok("Oil change recorded.".to_string())
            }
            "/service_chain_reset" => {
                self.bridge.settings().set(SERVICE_CHAIN, &Utc::now().to_rfc3339()).await?;
                Ok("Chain lube recorded.".to_string())
            }
            "/cancel" => Ok("Nothing to cancel.".to_string()),
            _ => Ok("Unrecognised command. Send /help for the list.".to_string()),
        }
    }

    fn challenge(&self, session: &str, action: CommandType) -> String {
        self.bridge.gate().begin(session, action);
        format!("Enter PIN to confirm {action}, or /cancel.")
    }

    async fn resolve_pin(&self, session: &str, supplied: &str) -> Result<String> {
        match self.bridge.gate().resolve(session, supplied) {
            Resolution::Authorized(grant) => {
                let action = grant.action();
                let command = self
                    .bridge
                    .issue_command(self.device_id, action, None, Some(grant))
                    .await?;
                Ok(format!("PIN accepted, {action} queued (#{}).", command.id))
            }
            Resolution::Denied => Ok("Wrong PIN, nothing was sent.".to_string()),
            Resolution::NoPendingAction => Ok("Nothing awaits a PIN.".to_string()),
        }
    }

    async fn refuel(&self, argument: Option<&str>) -> Result<String> {
        let liters = argument
            .and_then(|raw| raw.replace(',', ".").parse::<f64>().ok())
            .filter(|l| l.is_finite() && *l != 0.0);
        let Some(liters) = liters else {
            return Ok("Usage: /refuel 5.5".to_string());
        };

        self.bridge
            .issue_command(self.device_id, CommandType::RefuelAdjust, Some(json!(liters)), None)
            .await?;
        Ok(format!("Refuel of {liters} L queued."))
    }

    async fn status(&self) -> Result<String> {
        let latest = self.bridge.latest_telemetry(self.device_id).await?;
        let online = self.bridge.is_online(self.device_id, Utc::now()).await?;
        let service = self.service_record().await?;
        Ok(status::render_status(latest.as_ref(), online, &service))
    }

    async fn service_record(&self) -> Result<ServiceRecord> {
        Ok(ServiceRecord {
            last_oil_change: self.bridge.settings().get(SERVICE_OIL).await?,
            last_chain_lube: self.bridge.settings().get(SERVICE_CHAIN).await?,
        })
    }
}

fn is_cancel(text: &str) -> bool {
    text.eq_ignore_ascii_case("cancel") || text.eq_ignore_ascii_case("/cancel")
}
