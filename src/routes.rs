use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::Utc;
use log::warn;
use serde::Serialize;

use crate::bridge::DeviceBridge;
use crate::error::{BridgeError, Result};
use crate::model::*;
use crate::operator::OperatorConsole;

const DEFAULT_HISTORY_LIMIT: u32 = 50;
const MAX_HISTORY_LIMIT: u32 = 1000;

pub struct AppState {
    pub bridge: DeviceBridge,
    pub device_id: String,
}

#[derive(Serialize)]
struct LatestTelemetry {
    #[serde(flatten)]
    sample: TelemetrySample,
    online: bool,
}

#[get("/health")]
async fn health() -> impl Responder {
    "OK"
}

#[post("/telemetry")]
async fn post_telemetry(
    data: web::Data<AppState>,
    request: web::Json<TelemetryPayload>,
) -> Result<HttpResponse> {
    match data.bridge.receive_telemetry(&request).await {
        Ok(_) => Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))),
        Err(e) => {
            warn!("telemetry rejected: {e}");
            Err(e)
        }
    }
}

#[get("/telemetry/latest")]
async fn get_latest_telemetry(
    data: web::Data<AppState>,
    query: web::Query<CommandsQuery>,
) -> Result<HttpResponse> {
    let device_id = &query.device_id;
    let sample = data
        .bridge
        .latest_telemetry(device_id)
        .await?
        .ok_or_else(|| BridgeError::NoTelemetry(device_id.clone()))?;
    let online = data.bridge.is_online(device_id, Utc::now()).await?;

    Ok(HttpResponse::Ok().json(LatestTelemetry { sample, online }))
}

#[get("/telemetry/history")]
async fn get_telemetry_history(
    data: web::Data<AppState>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(MAX_HISTORY_LIMIT);
    let samples = data.bridge.telemetry_history(&query.device_id, limit).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "rows": samples.len(),
        "samples": samples
    })))
}

#[get("/commands")]
async fn get_commands(
    data: web::Data<AppState>,
    query: web::Query<CommandsQuery>,
) -> Result<HttpResponse> {
    let commands: Vec<CommandItem> = data
        .bridge
        .list_outstanding_commands(&query.device_id)
        .await?
        .into_iter()
        .map(CommandItem::from)
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({ "commands": commands })))
}

#[get("/commands/{id}")]
async fn get_command_by_id(
    data: web::Data<AppState>,
    path: web::Path<(i64,)>,
) -> Result<HttpResponse> {
    let command_id = path.into_inner().0;
    match data.bridge.command(command_id).await? {
        Some(command) => Ok(HttpResponse::Ok().json(command)),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "status": "error",
            "detail": format!("no command {command_id}")
        }))),
    }
}

#[post("/commands/ack")]
async fn post_command_ack(
    data: web::Data<AppState>,
    request: web::Json<AckRequest>,
) -> Result<HttpResponse> {
    data.bridge.acknowledge_command(request.command_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "acknowledged" })))
}

#[post("/operator/messages")]
async fn post_operator_message(
    data: web::Data<AppState>,
    request: web::Json<OperatorMessage>,
) -> Result<HttpResponse> {
    let console = OperatorConsole::new(&data.bridge, &data.device_id);
    let reply = console.handle(&request.session, &request.text).await?;
    Ok(HttpResponse::Ok().json(OperatorReply { reply }))
}

/// Routes plus extractor configs that turn malformed input into the
/// `{"status":"error","detail":...}` shape.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .content_type_required(false)
            .error_handler(|err, _req| BridgeError::InvalidPayload(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| BridgeError::InvalidPayload(err.to_string()).into()),
    )
    .service(health)
    .service(post_telemetry)
    .service(get_latest_telemetry)
    .service(get_telemetry_history)
    .service(get_commands)
    .service(get_command_by_id)
    .service(post_command_ack)
    .service(post_operator_message);
}
