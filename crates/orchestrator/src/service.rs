use std::sync::Arc;

use events::EventSender;
use node_core::{SessionId, UpgradeManifest};
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::Result;
use crate::process::{Elevation, ProcessRunner};
use crate::registry::{CancelOutcome, SessionRegistry, SessionSummary};
use crate::resources::SessionGuard;
use crate::sequencer::CommandSequencer;
use crate::upgrade::{UpgradeOutcome, UpgradeWorkflow};

/// Entry point for transports: starts runs, cancels them, cleans up after
/// clients that went away.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<SessionRegistry>,
    workflow: Arc<UpgradeWorkflow>,
}

impl Orchestrator {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        elevation: Elevation,
        manifest: UpgradeManifest,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let sequencer = Arc::new(CommandSequencer::new(
            runner,
            Arc::clone(&registry),
            elevation,
        ));
        let workflow = Arc::new(UpgradeWorkflow::new(sequencer, manifest));

        Self {
            registry,
            workflow,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn manifest(&self) -> &UpgradeManifest {
        self.workflow.manifest()
    }

    /// Start the upgrade workflow, streaming to `events`.
    pub fn start_upgrade(&self, events: EventSender) -> Result<JoinHandle<UpgradeOutcome>> {
        let session = self.registry.open(events)?;
        let registry = Arc::clone(&self.registry);
        let workflow = Arc::clone(&self.workflow);
        info!(session_id = %session.id(), "Starting upgrade");

        Ok(tokio::spawn(async move {
            let mut guard = SessionGuard::new(Arc::clone(&session), registry);
            let outcome = workflow.run(&session).await;
            guard.mark_completed();
            outcome
        }))
    }

    pub fn cancel(&self, id: &SessionId) -> CancelOutcome {
        self.registry.cancel(id)
    }

    pub fn disconnect(&self, id: &SessionId) -> CancelOutcome {
        self.registry.on_disconnect(id)
    }

    pub fn active_sessions(&self) -> Vec<SessionSummary> {
        self.registry.active_sessions()
    }
}
