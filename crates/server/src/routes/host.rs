use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::host::ServerInfo;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct NetworkReport {
    /// Report printed by the speed-test tool, passed through unchanged
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}

#[utoipa::path(
    get,
    path = "/api/network",
    responses(
        (status = 200, description = "Throughput measured by the speed-test tool", body = NetworkReport),
        (status = 500, description = "Speed test failed", body = crate::error::ErrorResponse)
    ),
    tag = "host"
)]
pub async fn network_speed(State(state): State<AppState>) -> Result<Json<NetworkReport>, AppError> {
    let data = state.network.run().await?;
    Ok(Json(NetworkReport { data }))
}

#[utoipa::path(
    get,
    path = "/api/server-info",
    responses(
        (status = 200, description = "Hostname and primary IPv4 address", body = ServerInfo)
    ),
    tag = "host"
)]
pub async fn server_info() -> Json<ServerInfo> {
    Json(ServerInfo::collect())
}
