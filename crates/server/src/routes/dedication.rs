use std::path::PathBuf;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use node_core::{DedicationRequest, DedicationResponse};
use orchestrator::{DedicationError, Dedicator};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct DedicatedQuery {
    /// Mount point holding the dedicated file
    #[param(value_type = String)]
    pub mount: PathBuf,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DedicatedSpaceResponse {
    pub mount: String,
    pub path: String,
    pub dedicated_bytes: u64,
}

#[utoipa::path(
    post,
    path = "/api/dedicate",
    request_body = DedicationRequest,
    responses(
        (status = 200, description = "Space dedicated and published", body = DedicationResponse),
        (status = 400, description = "Invalid request", body = DedicationResponse),
        (status = 422, description = "Dedication failed", body = DedicationResponse)
    ),
    tag = "dedication"
)]
pub async fn dedicate(
    State(state): State<AppState>,
    Json(request): Json<DedicationRequest>,
) -> (StatusCode, Json<DedicationResponse>) {
    match state.dedicator.dedicate(request.size, &request.mount).await {
        Ok(dedication) => (
            StatusCode::OK,
            Json(DedicationResponse::success(
                dedication.path.display().to_string(),
                dedication.symlink.display().to_string(),
            )),
        ),
        Err(err) => {
            let status = match err {
                DedicationError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            tracing::warn!(
                mount = %request.mount.display(),
                reason = err.reason(),
                rolled_back = err.is_rolled_back(),
                error = %err,
                "Dedication failed"
            );
            (
                status,
                Json(DedicationResponse::failure(err.to_string(), err.reason())),
            )
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/dedicate",
    params(DedicatedQuery),
    responses(
        (status = 200, description = "Space currently dedicated under the mount", body = DedicatedSpaceResponse),
        (status = 400, description = "Mount is not an absolute path")
    ),
    tag = "dedication"
)]
pub async fn get_dedicated_space(
    State(state): State<AppState>,
    Query(query): Query<DedicatedQuery>,
) -> Result<Json<DedicatedSpaceResponse>, AppError> {
    if !query.mount.is_absolute() {
        return Err(AppError::BadRequest(format!(
            "mount must be an absolute path: {}",
            query.mount.display()
        )));
    }

    let dedicated_bytes = state.dedicator.dedicated_bytes(&query.mount).await?;
    Ok(Json(DedicatedSpaceResponse {
        mount: query.mount.display().to_string(),
        path: Dedicator::target_path(&query.mount).display().to_string(),
        dedicated_bytes,
    }))
}
