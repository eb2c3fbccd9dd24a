use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeypairResponse {
    pub message: String,
    /// Base58 encoded ed25519 public key
    pub public_key: String,
}

#[utoipa::path(
    post,
    path = "/api/keypair/generate",
    responses(
        (status = 200, description = "Keypair generated and saved", body = KeypairResponse),
        (status = 400, description = "A keypair already exists", body = crate::error::ErrorResponse)
    ),
    tag = "keypair"
)]
pub async fn generate_keypair(
    State(state): State<AppState>,
) -> Result<Json<KeypairResponse>, AppError> {
    let public_key = state.keypairs.generate().await?;
    Ok(Json(KeypairResponse {
        message: "Keypair generated and saved successfully.".to_string(),
        public_key,
    }))
}

#[utoipa::path(
    get,
    path = "/api/keypair",
    responses(
        (status = 200, description = "Public key of the stored keypair", body = KeypairResponse),
        (status = 404, description = "No keypair has been generated", body = crate::error::ErrorResponse)
    ),
    tag = "keypair"
)]
pub async fn get_keypair(State(state): State<AppState>) -> Result<Json<KeypairResponse>, AppError> {
    let public_key = state.keypairs.public_key().await?;
    Ok(Json(KeypairResponse {
        message: "Public key retrieved successfully.".to_string(),
        public_key,
    }))
}
