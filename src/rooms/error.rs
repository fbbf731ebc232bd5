use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

use super::swap::SwapFailure;
use crate::{metadata::MetadataError, storage::StorageError};

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Main image swap failed during {} phase", .0.phase)]
    Swap(Box<SwapFailure>),
}

impl From<SwapFailure> for RoomError {
    fn from(failure: SwapFailure) -> Self {
        RoomError::Swap(Box::new(failure))
    }
}

impl RoomError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RoomError::Validation(_) => StatusCode::BAD_REQUEST,
            RoomError::NotFound(_) => StatusCode::NOT_FOUND,
            RoomError::Storage(_) | RoomError::Metadata(_) | RoomError::Swap(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> String {
        match self {
            RoomError::Validation(_) => "VALIDATION_ERROR".to_string(),
            RoomError::NotFound(_) => "NOT_FOUND".to_string(),
            RoomError::Storage(StorageError::Timeout(_)) => "STORAGE_TIMEOUT".to_string(),
            RoomError::Storage(_) => "STORAGE_ERROR".to_string(),
            RoomError::Metadata(_) => "METADATA_ERROR".to_string(),
            RoomError::Swap(failure) => {
                format!("SWAP_{}_FAILED", failure.phase.to_string().to_uppercase())
            }
        }
    }
}

impl IntoResponse for RoomError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let body = match &self {
            RoomError::Validation(message) | RoomError::NotFound(message) => json!({
                "success": false,
                "error": message,
                "details": message,
                "code": code,
            }),
            RoomError::Storage(e) => json!({
                "success": false,
                "error": "Object storage operation failed",
                "details": e.to_string(),
                "code": code,
            }),
            RoomError::Metadata(e) => json!({
                "success": false,
                "error": "Metadata store operation failed",
                "details": e.to_string(),
                "code": code,
            }),
            RoomError::Swap(failure) => json!({
                "success": false,
                "error": self.to_string(),
                "details": failure.details,
                "code": code,
                "phase": failure.phase,
                "recovery": failure.recovery,
                "note": failure.recovery.guidance(),
                "stagingKeys": failure.staging_keys,
            }),
        };

        if status.is_server_error() {
            tracing::error!(code = %code, "{}", self);
        }
        (status, Json(body)).into_response()
    }
}
