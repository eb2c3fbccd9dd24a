use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use orchestrator::{DedicationError, KeypairError, NetworkTestError, OrchestratorError};

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Orchestrator(OrchestratorError),
    Dedication(DedicationError),
    Keypair(KeypairError),
    Network(NetworkTestError),
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Orchestrator(err) => match err {
                OrchestratorError::SessionNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "not_found",
                    format!("Session not found: {}", id),
                ),
                OrchestratorError::SessionExists(_) | OrchestratorError::SessionBusy(_) => {
                    (StatusCode::CONFLICT, "conflict", err.to_string())
                }
                _ => {
                    tracing::error!("Orchestrator error: {:?}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "orchestrator_error",
                        err.to_string(),
                    )
                }
            },
            AppError::Dedication(err) => match err {
                DedicationError::InvalidRequest(msg) => {
                    (StatusCode::BAD_REQUEST, "bad_request", msg)
                }
                _ => {
                    tracing::error!("Dedication error: {:?}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        err.reason(),
                        err.to_string(),
                    )
                }
            },
            AppError::Keypair(err) => match err {
                KeypairError::AlreadyExists(_) => {
                    (StatusCode::BAD_REQUEST, "keypair_exists", err.to_string())
                }
                KeypairError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
                _ => {
                    tracing::error!("Keypair error: {:?}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "keypair_error",
                        err.to_string(),
                    )
                }
            },
            AppError::Network(err) => {
                tracing::warn!("Network test failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "network_test_failed",
                    err.to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        AppError::Orchestrator(err)
    }
}

impl From<DedicationError> for AppError {
    fn from(err: DedicationError) -> Self {
        AppError::Dedication(err)
    }
}

impl From<KeypairError> for AppError {
    fn from(err: KeypairError) -> Self {
        AppError::Keypair(err)
    }
}

impl From<NetworkTestError> for AppError {
    fn from(err: NetworkTestError) -> Self {
        AppError::Network(err)
    }
}
