use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use node_core::SessionId;
use orchestrator::{CancelOutcome, SessionSummary, CANCELLED_MESSAGE, NO_ACTIVE_COMMAND};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: SessionId,
    /// Whether an external process is live right now
    pub running: bool,
    pub current_step: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl From<SessionSummary> for SessionInfo {
    fn from(summary: SessionSummary) -> Self {
        Self {
            id: summary.id,
            running: summary.running,
            current_step: summary.current_step,
            started_at: summary.started_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelResponse {
    pub cancelled: bool,
    pub message: String,
}

#[utoipa::path(
    get,
    path = "/api/sessions",
    responses(
        (status = 200, description = "Sessions currently running", body = Vec<SessionInfo>)
    ),
    tag = "sessions"
)]
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    let sessions = state
        .orchestrator
        .active_sessions()
        .into_iter()
        .map(SessionInfo::from)
        .collect();
    Json(sessions)
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/cancel",
    params(
        ("id" = String, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Running command interrupted", body = CancelResponse),
        (status = 404, description = "No active command to cancel")
    ),
    tag = "sessions"
)]
pub async fn cancel_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<Json<CancelResponse>, AppError> {
    match state.orchestrator.cancel(&id) {
        CancelOutcome::Cancelled => {
            tracing::info!(session_id = %id, "Session cancelled over HTTP");
            Ok(Json(CancelResponse {
                cancelled: true,
                message: CANCELLED_MESSAGE.to_string(),
            }))
        }
        CancelOutcome::NoActiveCommand => Err(AppError::NotFound(NO_ACTIVE_COMMAND.to_string())),
    }
}
