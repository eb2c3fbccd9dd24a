use events::RunEvent;
use node_core::SessionId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start the upgrade workflow; a session id is generated when omitted.
    StartUpgrade {
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    /// Cancel a session, by default the one this socket started.
    Cancel {
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionStarted { session_id: SessionId },
    Event { event: RunEvent },
    Pong,
    Error { message: String },
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
