//! Event types streamed to the operator during a run

use node_core::SessionId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Kind of a run event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Stdout,
    Stderr,
    Error,
    Complete,
    Cancelled,
}

/// Final status attached to terminal events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
    Cancelled,
}

/// One message on a session's stream.
///
/// Within a session, `complete`, `cancelled` and `error` are terminal: exactly
/// one of them closes the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    pub session_id: SessionId,
    pub kind: EventKind,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
}

impl RunEvent {
    pub fn stdout(session_id: SessionId, data: impl Into<String>) -> Self {
        Self::new(session_id, EventKind::Stdout, data, None)
    }

    pub fn stderr(session_id: SessionId, data: impl Into<String>) -> Self {
        Self::new(session_id, EventKind::Stderr, data, None)
    }

    pub fn error(session_id: SessionId, data: impl Into<String>) -> Self {
        Self::new(session_id, EventKind::Error, data, Some(RunStatus::Error))
    }

    pub fn complete(session_id: SessionId, data: impl Into<String>) -> Self {
        Self::new(
            session_id,
            EventKind::Complete,
            data,
            Some(RunStatus::Success),
        )
    }

    pub fn cancelled(session_id: SessionId, data: impl Into<String>) -> Self {
        Self::new(
            session_id,
            EventKind::Cancelled,
            data,
            Some(RunStatus::Cancelled),
        )
    }

    fn new(
        session_id: SessionId,
        kind: EventKind,
        data: impl Into<String>,
        status: Option<RunStatus>,
    ) -> Self {
        Self {
            session_id,
            kind,
            data: data.into(),
            status,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::Error | EventKind::Complete | EventKind::Cancelled
        )
    }
}
