use std::io::Error as IoError;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, error::JsonPayloadError, web};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use vigil_service::Error as ServiceError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("Address parsing error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    #[error("Configuration error: {0}")]
    Config(#[from] vigil_service::config::Error),
    #[error("Startup failed: {0:#}")]
    Startup(#[from] anyhow::Error),
}

/// Domain error rendered as `{"detail": ...}` with a matching status
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("{0}")]
    BadPayload(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Service(ServiceError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Service(ServiceError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            ApiError::Service(ServiceError::Validation(_)) | ApiError::BadPayload(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Service(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let detail = if status.is_server_error() {
            error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        HttpResponse::build(status).json(json!({ "detail": detail }))
    }
}

/// Malformed JSON bodies answer like validation failures.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err: JsonPayloadError, _req| {
        ApiError::BadPayload(err.to_string()).into()
    })
}
