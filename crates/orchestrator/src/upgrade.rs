//! The upgrade workflow: agent, managed service, companion, then restart.

use std::sync::Arc;

use node_core::{StepDescriptor, UpgradeManifest, UpgradeState};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::{OrchestratorError, Result};
use crate::registry::Session;
use crate::sequencer::CommandSequencer;
use crate::state_machine::UpgradeStateMachine;

pub const UPGRADE_COMPLETE_MESSAGE: &str = "Upgrade completed successfully";

/// How a run ended.
#[derive(Debug)]
pub struct UpgradeOutcome {
    pub state: UpgradeState,
    /// Detached restart of the upgraded services, if one was fired.
    pub restart: Option<JoinHandle<()>>,
}

pub struct UpgradeWorkflow {
    sequencer: Arc<CommandSequencer>,
    manifest: Arc<UpgradeManifest>,
}

impl UpgradeWorkflow {
    pub fn new(sequencer: Arc<CommandSequencer>, manifest: UpgradeManifest) -> Self {
        Self {
            sequencer,
            manifest: Arc::new(manifest),
        }
    }

    pub fn sequencer(&self) -> &Arc<CommandSequencer> {
        &self.sequencer
    }

    pub fn manifest(&self) -> &UpgradeManifest {
        &self.manifest
    }

    /// Drive `session` through every phase and emit exactly one terminal event.
    ///
    /// On success the `complete` event is sent before the restart steps are
    /// spawned, since restarting may take the agent itself down.
    pub async fn run(&self, session: &Session) -> UpgradeOutcome {
        let mut state = UpgradeState::Idle;
        let result = self.run_phases(session, &mut state).await;

        let last = match &result {
            Ok(()) => UpgradeState::Completed,
            Err(OrchestratorError::Cancelled) => UpgradeState::Cancelled,
            Err(_) => UpgradeState::Error,
        };
        if let Err(err) = transition(session, &mut state, last) {
            error!(session_id = %session.id(), error = %err, "Unexpected final transition");
            state = last;
        }

        self.sequencer.settle(session, &result, UPGRADE_COMPLETE_MESSAGE);

        let restart = (state == UpgradeState::Completed && !self.manifest.restart.is_empty())
            .then(|| self.spawn_restart());

        UpgradeOutcome { state, restart }
    }

    async fn run_phases(&self, session: &Session, state: &mut UpgradeState) -> Result<()> {
        while let Some(phase) = UpgradeStateMachine::next_state(state) {
            let Some(steps) = self.phase_steps(&phase) else {
                break;
            };
            transition(session, state, phase)?;
            self.sequencer.run_steps(session, steps).await?;
        }
        Ok(())
    }

    /// Steps of a running phase; `None` once no phase is left to run.
    fn phase_steps(&self, phase: &UpgradeState) -> Option<&[StepDescriptor]> {
        match phase {
            UpgradeState::UpdatingAgent => Some(&self.manifest.agent_update),
            UpgradeState::InstallingService => Some(&self.manifest.service_install),
            UpgradeState::UpdatingCompanion => Some(&self.manifest.companion_update),
            _ => None,
        }
    }

    fn spawn_restart(&self) -> JoinHandle<()> {
        let sequencer = Arc::clone(&self.sequencer);
        let manifest = Arc::clone(&self.manifest);
        tokio::spawn(async move {
            info!(steps = manifest.restart.len(), "Restarting upgraded services");
            sequencer.run_detached(&manifest.restart).await;
        })
    }
}

fn transition(session: &Session, state: &mut UpgradeState, next: UpgradeState) -> Result<()> {
    UpgradeStateMachine::validate_transition(state, &next)?;
    info!(
        session_id = %session.id(),
        from = state.as_str(),
        to = next.as_str(),
        "Upgrade state changed"
    );
    *state = next;
    Ok(())
}
