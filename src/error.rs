use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use log::error;
use thiserror::Error;

use crate::model::CommandType;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The caller sent something we cannot store or act on.
    #[error("{0}")]
    InvalidPayload(String),

    /// A privileged command arrived without a matching PIN grant.
    #[error("command {0} requires PIN authorization")]
    Unauthorized(CommandType),

    #[error("no telemetry for device {0}")]
    NoTelemetry(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

impl ResponseError for BridgeError {
    fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            BridgeError::Unauthorized(_) => StatusCode::FORBIDDEN,
            BridgeError::NoTelemetry(_) => StatusCode::NOT_FOUND,
            BridgeError::Storage(_) | BridgeError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Storage details stay in the log, the device only needs to know to try again.
        let detail = match self {
            BridgeError::Storage(err) => {
                error!("storage error: {err}");
                "storage unavailable".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "status": "error",
            "detail": detail,
        }))
    }
}
