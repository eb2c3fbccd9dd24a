use node_core::UpgradeState;

use crate::error::{OrchestratorError, Result};

pub struct UpgradeStateMachine;

impl UpgradeStateMachine {
    pub fn validate_transition(from: &UpgradeState, to: &UpgradeState) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &UpgradeState) -> Vec<UpgradeState> {
        match from {
            UpgradeState::Idle => vec![UpgradeState::UpdatingAgent, UpgradeState::Error],
            UpgradeState::UpdatingAgent => vec![
                UpgradeState::InstallingService,
                UpgradeState::Error,
                UpgradeState::Cancelled,
            ],
            UpgradeState::InstallingService => vec![
                UpgradeState::UpdatingCompanion,
                UpgradeState::Error,
                UpgradeState::Cancelled,
            ],
            UpgradeState::UpdatingCompanion => vec![
                UpgradeState::Completed,
                UpgradeState::Error,
                UpgradeState::Cancelled,
            ],
            UpgradeState::Completed | UpgradeState::Error | UpgradeState::Cancelled => vec![],
        }
    }

    /// The phase that follows a successful one.
    pub fn next_state(current: &UpgradeState) -> Option<UpgradeState> {
        match current {
            UpgradeState::Idle => Some(UpgradeState::UpdatingAgent),
            UpgradeState::UpdatingAgent => Some(UpgradeState::InstallingService),
            UpgradeState::InstallingService => Some(UpgradeState::UpdatingCompanion),
            UpgradeState::UpdatingCompanion => Some(UpgradeState::Completed),
            UpgradeState::Completed | UpgradeState::Error | UpgradeState::Cancelled => None,
        }
    }
}
