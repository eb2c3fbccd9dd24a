use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Phases of the upgrade workflow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeState {
    #[default]
    Idle,
    UpdatingAgent,
    InstallingService,
    UpdatingCompanion,
    Completed,
    Error,
    Cancelled,
}

impl UpgradeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::UpdatingAgent => "updating_agent",
            Self::InstallingService => "installing_service",
            Self::UpdatingCompanion => "updating_companion",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Completed, Error and Cancelled absorb every further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }
}
