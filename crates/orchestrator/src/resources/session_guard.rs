//! RAII guard for session lifecycle management.
//!
//! If the task driving a run is dropped or panics, the guard makes sure the
//! client still sees a terminal event and the session's process is interrupted.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::registry::{Session, SessionRegistry};

pub const UNEXPECTED_TERMINATION: &str = "Session terminated unexpectedly";

/// RAII guard for one run.
///
/// # Example
///
/// ```ignore
/// let mut guard = SessionGuard::new(session.clone(), registry.clone());
/// workflow.run(&session).await;
/// guard.mark_completed(); // Must call this once the run reported its outcome
/// ```
pub struct SessionGuard {
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
    completed: bool,
}

impl SessionGuard {
    pub fn new(session: Arc<Session>, registry: Arc<SessionRegistry>) -> Self {
        debug!(session_id = %session.id(), "Session guard created");

        Self {
            session,
            registry,
            completed: false,
        }
    }

    /// The run emitted its own terminal event.
    pub fn mark_completed(&mut self) {
        debug!(session_id = %self.session.id(), "Session marked as completed");
        self.completed = true;
    }

    fn emit_failure(&self, error: &str) {
        // The error goes out first so the cancel below cannot replace it.
        self.session.events().fail(error);
        self.registry.on_disconnect(&self.session.id());
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.completed {
            warn!(
                session_id = %self.session.id(),
                "Session guard dropped without completion - emitting failure"
            );

            self.emit_failure(UNEXPECTED_TERMINATION);
        }
    }
}
